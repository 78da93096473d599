//! Terminal rendering of session state.

use std::io::Write;

use tokio::sync::watch;
use vidpress_core::{Session, SessionStep};

/// Width of the progress bar in characters.
const BAR_WIDTH: usize = 30;

/// Renders session updates to stderr until the channel closes.
///
/// Only the latest state is drawn; intermediate updates a slow terminal
/// misses are skipped.
pub async fn follow(mut rx: watch::Receiver<Session>) {
    let mut last_step = None;
    while rx.changed().await.is_ok() {
        let (step, percent) = {
            let session = rx.borrow_and_update();
            (session.step, session.progress_percent)
        };

        let mut stderr = std::io::stderr().lock();
        match step {
            SessionStep::Processing => {
                let _ = write!(stderr, "\r{}", progress_line(percent));
            }
            SessionStep::Complete if last_step == Some(SessionStep::Processing) => {
                let _ = writeln!(stderr, "\r{}", progress_line(100));
            }
            SessionStep::AwaitingEngine => {
                let _ = writeln!(stderr, "Loading video engine...");
            }
            SessionStep::Failed if last_step == Some(SessionStep::Processing) => {
                let _ = writeln!(stderr);
            }
            _ => {}
        }
        let _ = stderr.flush();
        last_step = Some(step);
    }
}

fn progress_line(percent: u8) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * BAR_WIDTH / 100;
    format!(
        "Processing [{}{}] {:>3}%",
        "#".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        percent
    )
}
