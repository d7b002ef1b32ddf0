use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

/// Console log writer that hands each formatted event to the UI task, so
/// log lines are printed above the progress bars instead of through them.
struct UiLogWriter {
    sender: mpsc::Sender<UiEvent>,
    buffer: Vec<u8>,
}

impl Write for UiLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for UiLogWriter {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.buffer);
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        if self.sender.try_send(UiEvent::Log(line.to_string())).is_err() {
            eprintln!("{line}");
        }
    }
}

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Installs the global subscriber: a console layer routed through the UI
/// and, when `log_file` is given, an append-mode file layer that always
/// records at least INFO.
pub fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let console_filter = level_filter(verbosity, quiet);
    let console_layer = fmt::layer()
        .with_writer(move || UiLogWriter {
            sender: ui_sender.clone(),
            buffer: Vec::new(),
        })
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let file_filter = console_filter.max(LevelFilter::INFO);
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, info, warn};

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(5, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::ERROR);
    }

    #[test]
    fn ui_writer_sends_one_event_per_record() {
        let (sender, mut receiver) = mpsc::channel(4);
        {
            let mut writer = UiLogWriter {
                sender,
                buffer: Vec::new(),
            };
            write!(writer, "WARN reconciled ").unwrap();
            writeln!(writer, "3 peaklists").unwrap();
        }
        match receiver.try_recv().unwrap() {
            UiEvent::Log(line) => assert_eq!(line, "WARN reconciled 3 peaklists"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    #[serial]
    fn file_layer_appends_to_existing_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("farseer.log");
        fs::write(&log_path, "previous run\n").unwrap();

        let file = OpenOptions::new().append(true).open(&log_path).unwrap();
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true);
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            info!(views = 4, "Computed titration views.");
            debug!("Fitted column.");
            warn!("Residue absent from the reference.");
        });

        thread::sleep(Duration::from_millis(100));

        let content = fs::read_to_string(log_path).unwrap();
        assert!(content.starts_with("previous run\n"));
        assert!(content.contains("Computed titration views."));
        assert!(content.contains("views=4"));
        assert!(content.contains("ThreadId"));
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (sender, _receiver) = mpsc::channel(1);
        let result = setup_logging(0, false, Some(temp_dir.path()), sender);
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
