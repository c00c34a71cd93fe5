//! Stand-ins for the player and the board.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use radio_proto::player::{Backend, CommandOutput};

use crate::hardware::{Hardware, HardwareError, Level};

/// Records every command; `status` answers with the configured text.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    status_text: Mutex<String>,
}

impl RecordingBackend {
    pub fn set_status(&self, text: &str) {
        *self.status_text.lock().unwrap() = text.to_string();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Drain, dropping the watchdog's status polls.
    pub fn take_commands(&self) -> Vec<String> {
        self.take_calls()
            .into_iter()
            .filter(|c| c != "status")
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
        self.calls.lock().unwrap().push(args.join(" "));
        async move { CommandOutput::success(output) }
    }
}

struct BoardState {
    pins: HashMap<u32, Level>,
    position: i32,
    button: Level,
    pins_fail: bool,
    encoder_fails: bool,
    released: bool,
}

/// Scriptable board.  Clones share state so a test can keep a handle after
/// moving one into the control loop.  Unset pins read HIGH (pulled up).
#[derive(Clone)]
pub struct MockHardware(Arc<Mutex<BoardState>>);

impl Default for MockHardware {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(BoardState {
            pins: HashMap::new(),
            position: 0,
            button: Level::High,
            pins_fail: false,
            encoder_fails: false,
            released: false,
        })))
    }
}

impl MockHardware {
    /// Drive four active-low pins to encode `value`.
    pub fn set_bcd(&self, pins: &[u32; 4], value: u8) {
        let mut board = self.0.lock().unwrap();
        for (bit, pin) in pins.iter().enumerate() {
            let level = if value & (1 << bit) != 0 {
                Level::Low
            } else {
                Level::High
            };
            board.pins.insert(*pin, level);
        }
    }

    pub fn set_pin(&self, pin: u32, level: Level) {
        self.0.lock().unwrap().pins.insert(pin, level);
    }

    pub fn set_position(&self, position: i32) {
        self.0.lock().unwrap().position = position;
    }

    pub fn set_button(&self, level: Level) {
        self.0.lock().unwrap().button = level;
    }

    pub fn fail_pins(&self, fail: bool) {
        self.0.lock().unwrap().pins_fail = fail;
    }

    pub fn fail_encoder(&self, fail: bool) {
        self.0.lock().unwrap().encoder_fails = fail;
    }

    pub fn released(&self) -> bool {
        self.0.lock().unwrap().released
    }
}

fn bus_error() -> HardwareError {
    HardwareError::I2c {
        bus: "/dev/i2c-test".into(),
        source: std::io::Error::other("nack"),
    }
}

impl Hardware for MockHardware {
    fn read_pin(&mut self, pin: u32) -> Result<Level, HardwareError> {
        let board = self.0.lock().unwrap();
        if board.pins_fail {
            return Err(HardwareError::Gpio {
                pin,
                source: std::io::Error::other("gone"),
            });
        }
        Ok(*board.pins.get(&pin).unwrap_or(&Level::High))
    }

    fn encoder_position(&mut self) -> Result<i32, HardwareError> {
        let board = self.0.lock().unwrap();
        if board.encoder_fails {
            return Err(bus_error());
        }
        Ok(board.position)
    }

    fn encoder_button(&mut self) -> Result<Level, HardwareError> {
        let board = self.0.lock().unwrap();
        if board.encoder_fails {
            return Err(bus_error());
        }
        Ok(board.button)
    }

    fn release(&mut self) {
        self.0.lock().unwrap().released = true;
    }
}
