//! The single HTML control page.

use radio_proto::catalog::StationCatalog;
use radio_proto::player::{PlayerState, PlayerStatus};

const STYLE: &str = r#"
    body { font-family: sans-serif; max-width: 640px; margin: 2rem auto; padding: 0 1rem; }
    h1 { margin-bottom: 0.5rem; }
    .card { border: 1px solid #ddd; border-radius: 10px; padding: 1rem; margin-bottom: 1rem; }
    button, select { font-size: 1rem; padding: 0.5rem; width: 100%; margin-top: 0.5rem; }
    .row { display: grid; grid-template-columns: 1fr 1fr; gap: 0.5rem; }
    .msg { color: #0a5; font-weight: 600; min-height: 1.2rem; }
    .muted { color: #666; font-size: 0.9rem; }
"#;

pub fn escape(s: &str) -> String {
    htmlescape::encode_minimal(s)
}

fn state_label(state: PlayerState) -> &'static str {
    match state {
        PlayerState::Playing => "playing",
        PlayerState::Paused => "paused",
        PlayerState::Stopped => "stopped",
    }
}

/// `m:ss`, or `h:mm:ss` past the hour.
fn clock(secs: u32) -> String {
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn position(status: &PlayerStatus) -> Option<String> {
    let elapsed = clock(status.elapsed_secs?);
    Some(match status.duration_secs.filter(|&d| d > 0) {
        Some(total) => format!("{} / {}", elapsed, clock(total)),
        None => elapsed,
    })
}

/// One `<optgroup>` per bank, labelled with the bank's name when it has one.
fn station_options(catalog: &StationCatalog) -> String {
    let mut html = String::new();
    let mut open_bank = None;
    for (slot, entry) in catalog.iter() {
        if open_bank != Some(slot.bank) {
            if open_bank.is_some() {
                html.push_str("</optgroup>\n");
            }
            let label = match catalog.bank_name(slot.bank) {
                Some(name) => format!("Bank {}: {}", slot.bank, escape(name)),
                None => format!("Bank {}", slot.bank),
            };
            html.push_str(&format!(r#"<optgroup label="{}">"#, label));
            html.push('\n');
            open_bank = Some(slot.bank);
        }
        html.push_str(&format!(
            r#"<option value="{b}:{s}">Station {s}: {name}</option>"#,
            b = slot.bank,
            s = slot.station,
            name = escape(&entry.name)
        ));
        html.push('\n');
    }
    if open_bank.is_none() {
        return "<option disabled>No stations configured</option>".to_string();
    }
    html.push_str("</optgroup>");
    html
}

pub fn render(
    status: &PlayerStatus,
    catalog: &StationCatalog,
    message: Option<&str>,
    volume_step: u8,
) -> String {
    let volume = status
        .volume
        .map(|v| format!("{}%", v))
        .unwrap_or_else(|| "unknown".to_string());
    let track = status
        .track
        .as_deref()
        .map(escape)
        .unwrap_or_else(|| "Nothing".to_string());
    let position = position(status)
        .map(|p| format!("<br>\n    <strong>Position:</strong> {}", p))
        .unwrap_or_default();

    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Radio Control</title>
  <style>{style}</style>
</head>
<body>
  <h1>Radio Control</h1>
  <p class="muted">Open this page from any device on the same network.</p>

  <div class="card">
    <strong>Status:</strong> {state}<br>
    <strong>Volume:</strong> {volume}<br>
    <strong>Now playing:</strong> {track}{position}
  </div>

  <div class="card">
    <form method="post" action="/action/play_station">
      <label for="station"><strong>Choose station</strong></label>
      <select name="station" id="station">{options}</select>
      <button type="submit">Play selected station</button>
    </form>
  </div>

  <div class="card">
    <div class="row">
      <form method="post" action="/action/toggle"><button type="submit">Play / Pause</button></form>
      <form method="post" action="/action/stop"><button type="submit">Stop</button></form>
    </div>
    <div class="row">
      <form method="post" action="/action/vol_down"><button type="submit">Volume -{step}</button></form>
      <form method="post" action="/action/vol_up"><button type="submit">Volume +{step}</button></form>
    </div>
  </div>

  <p class="msg">{message}</p>
</body>
</html>
"#,
        style = STYLE,
        state = state_label(status.state),
        volume = volume,
        track = track,
        position = position,
        options = station_options(catalog),
        step = volume_step,
        message = message.map(escape).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        let escaped = escape(r#"<b>"Rock" & 'Roll'</b>"#);
        assert!(escaped.starts_with("&lt;b&gt;&quot;Rock&quot; &amp; "));
        assert!(escaped.ends_with("&lt;/b&gt;"));
        assert!(!escaped.contains('\''));
        assert_eq!(escape("Radio Paradise"), "Radio Paradise");
    }

    #[test]
    fn clock_formats_minutes_and_hours() {
        assert_eq!(clock(5), "0:05");
        assert_eq!(clock(222), "3:42");
        assert_eq!(clock(3723), "1:02:03");
    }

    #[test]
    fn renders_status_and_stations() {
        let catalog = StationCatalog::parse(
            "banks:\n  1:\n    name: Night & Day\n    stations:\n      3: { name: \"Jazz <FM>\", type: stream, url: \"http://j\" }\n  2:\n    stations:\n      0: { name: Rain, type: file, path: rain.mp3 }\n",
            false,
        )
        .unwrap();
        let status = PlayerStatus {
            state: PlayerState::Paused,
            track: Some("Song".into()),
            elapsed_secs: Some(65),
            duration_secs: Some(222),
            volume: Some(35),
            ..PlayerStatus::default()
        };
        let html = render(&status, &catalog, Some("Done"), 5);
        assert!(html.contains("<strong>Status:</strong> paused"));
        assert!(html.contains("35%"));
        assert!(html.contains(r#"value="1:3""#));
        assert!(html.contains("Station 3: Jazz &lt;FM&gt;"));
        assert!(html.contains(r#"<optgroup label="Bank 1: Night &amp; Day">"#));
        assert!(html.contains(r#"<optgroup label="Bank 2">"#));
        assert_eq!(html.matches("</optgroup>").count(), 2);
        assert!(html.contains("<strong>Position:</strong> 1:05 / 3:42"));
        assert!(html.contains("Volume +5"));
        assert!(html.contains(r#"<p class="msg">Done</p>"#));
    }

    #[test]
    fn empty_catalog_and_unknown_volume() {
        let html = render(&PlayerStatus::default(), &StationCatalog::default(), None, 5);
        assert!(html.contains("No stations configured"));
        assert!(html.contains("unknown"));
        assert!(html.contains("Nothing"));
        assert!(!html.contains("Position:"));
    }
}
