//! Terminal rendering of store events.

use colored::{ColoredString, Colorize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lib_miao::telemetry::StoreEvent;
use lib_miao::{LogEntry, LogLevel, StreamKind, TrafficSample};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable throughput, 1024-based.
pub fn format_rate(bytes_per_sec: u64) -> String {
    if bytes_per_sec < 1024 {
        return format!("{} B/s", bytes_per_sec);
    }
    let mut value = bytes_per_sec as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}/s", value, UNITS[unit])
}

pub fn traffic_text(sample: TrafficSample) -> String {
    format!("up {}  down {}", format_rate(sample.up), format_rate(sample.down))
}

fn log_text(entry: &LogEntry) -> ColoredString {
    let line = entry.to_string();
    match entry.level {
        LogLevel::Error => line.bright_red(),
        LogLevel::Warning => line.bright_yellow(),
        LogLevel::Info => line.bright_green(),
        LogLevel::Debug => line.truecolor(128, 128, 128),
    }
}

fn connection_text(stream: StreamKind, connected: bool) -> ColoredString {
    let text = format!("[{}] {}", stream, if connected { "connected" } else { "disconnected" });
    if connected {
        text.bright_cyan()
    } else {
        text.bright_magenta()
    }
}

/// One printable line per event, or `None` for events the terminal skips.
pub fn render(event: &StoreEvent) -> Option<String> {
    match event {
        StoreEvent::Traffic(sample) => Some(traffic_text(*sample).bright_white().to_string()),
        StoreEvent::Connection { stream, connected } => {
            Some(connection_text(*stream, *connected).to_string())
        }
        StoreEvent::LogAppended(entry) => Some(log_text(entry).to_string()),
        StoreEvent::LogsReplaced { count } => Some(
            format!("loaded {} recent log lines", count)
                .truecolor(128, 128, 128)
                .to_string(),
        ),
        StoreEvent::LogsCleared => None,
    }
}

pub async fn run(mut events: mpsc::UnboundedReceiver<StoreEvent>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => {
                    if let Some(line) = render(&event) {
                        println!("{}", line);
                    }
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_scale_by_1024() {
        assert_eq!(format_rate(0), "0 B/s");
        assert_eq!(format_rate(1023), "1023 B/s");
        assert_eq!(format_rate(1024), "1.0 KB/s");
        assert_eq!(format_rate(1536), "1.5 KB/s");
        assert_eq!(format_rate(5 * 1024 * 1024), "5.0 MB/s");
    }

    #[test]
    fn traffic_line_shows_both_directions() {
        assert_eq!(traffic_text(TrafficSample::new(100, 2048)), "up 100 B/s  down 2.0 KB/s");
    }

    #[test]
    fn cleared_logs_are_not_printed() {
        assert!(render(&StoreEvent::LogsCleared).is_none());
        let line = render(&StoreEvent::LogAppended(LogEntry::new("t", LogLevel::Error, "boom")))
            .expect("printable");
        assert!(line.contains("t [ERROR] boom"));
    }
}
