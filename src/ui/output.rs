use std::io::{self, Stdout, Write};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::errors::UploadError;
use crate::transfer::UploadObserver;
use crate::types::{ProgressEvent, TransferResult};

/// Upload progress for the terminal. A spinner on stderr covers the wait
/// for the connection, then stdout gets one percentage line per part.
/// A retry brings the spinner back until the new attempt makes progress.
pub struct ProgressPrinter<W: Write = Stdout> {
    out: W,
    waiting: Option<ProgressBar>,
    draw_spinner: bool,
}

impl ProgressPrinter<Stdout> {
    pub fn stdout() -> Self {
        let mut printer = Self {
            out: io::stdout(),
            waiting: None,
            draw_spinner: true,
        };
        printer.wait("Connecting...".to_string());
        printer
    }
}

impl<W: Write> ProgressPrinter<W> {
    /// Lines go to `out` and the spinner is never drawn.
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            waiting: None,
            draw_spinner: false,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.is_some()
    }

    fn wait(&mut self, msg: String) {
        self.stop_waiting();
        let pb = if self.draw_spinner {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(msg);
        self.waiting = Some(pb);
    }

    fn stop_waiting(&mut self) {
        if let Some(pb) = self.waiting.take() {
            pb.finish_and_clear();
        }
    }
}

impl<W: Write> UploadObserver for ProgressPrinter<W> {
    fn on_progress(&mut self, event: ProgressEvent) {
        self.stop_waiting();
        // A closed stdout must not abort the upload
        let _ = writeln!(self.out, "{}", progress_line(&event));
    }

    fn on_retry(&mut self, error: &UploadError, attempt: u32, wait: Duration) {
        self.wait(retry_line(error, attempt, wait));
    }
}

impl<W: Write> Drop for ProgressPrinter<W> {
    fn drop(&mut self) {
        self.stop_waiting();
    }
}

// One line per acknowledged part, e.g. "40.0%"
pub fn progress_line(event: &ProgressEvent) -> String {
    format!("{:.1}%", event.percent())
}

pub fn retry_line(error: &UploadError, attempt: u32, wait: Duration) -> String {
    format!(
        "{}, retry {} in {:.1}s...",
        error,
        attempt,
        wait.as_secs_f64()
    )
}

pub fn print_success(result: &TransferResult) {
    println!(
        "{} Upload complete! (message id {})",
        style("✓").green().bold(),
        result.remote_id
    );
}

pub fn print_error(err: &dyn std::fmt::Display) {
    eprintln!("{} Error: {}", style("✗").red().bold(), err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line_one_decimal() {
        let event = ProgressEvent {
            bytes_sent: 1,
            total_bytes: 3,
        };
        assert_eq!(progress_line(&event), "33.3%");

        let done = ProgressEvent {
            bytes_sent: 3,
            total_bytes: 3,
        };
        assert_eq!(progress_line(&done), "100.0%");
    }

    #[test]
    fn test_printer_writes_a_line_per_event_and_rearms_on_retry() {
        let mut buf = Vec::new();
        {
            let mut printer = ProgressPrinter::with_writer(&mut buf);
            printer.on_progress(ProgressEvent {
                bytes_sent: 1,
                total_bytes: 4,
            });
            assert!(!printer.is_waiting());

            let err = UploadError::RateLimited {
                retry_after: Duration::from_secs(3),
            };
            printer.on_retry(&err, 1, Duration::from_secs(3));
            assert!(printer.is_waiting());

            printer.on_progress(ProgressEvent {
                bytes_sent: 4,
                total_bytes: 4,
            });
            assert!(!printer.is_waiting());
        }

        assert_eq!(String::from_utf8(buf).unwrap(), "25.0%\n100.0%\n");
    }

    #[test]
    fn test_retry_line() {
        let err = UploadError::Network("connection reset".into());
        assert_eq!(
            retry_line(&err, 2, Duration::from_millis(1500)),
            "network error: connection reset, retry 2 in 1.5s..."
        );
    }
}
