//! Recording stand-in for the media-player backend.

use radio_proto::player::{Backend, CommandOutput};
use std::future::Future;
use std::sync::Mutex;

#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub status_text: Mutex<String>,
}

impl RecordingBackend {
    pub fn with_status(text: &str) -> Self {
        let backend = Self::default();
        *backend.status_text.lock().unwrap() = text.to_string();
        backend
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.join(" "))
            .collect()
    }
}

impl Backend for RecordingBackend {
    fn command(&self, args: Vec<String>) -> impl Future<Output = CommandOutput> + Send {
        let output = if args.first().map(String::as_str) == Some("status") {
            self.status_text.lock().unwrap().clone()
        } else {
            String::new()
        };
        self.calls.lock().unwrap().push(args);
        async move { CommandOutput::success(output) }
    }
}
