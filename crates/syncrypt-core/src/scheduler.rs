use crossbeam_channel::{after, select, Receiver};
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::MIN_INTERVAL_MS;
use crate::error::Error;

/// Runs passes back to back with a fixed pause between them until told to stop.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(MIN_INTERVAL_MS)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `pass` immediately, then again after every interval, until a
    /// message arrives on `shutdown` or every sender is dropped. A signal that
    /// lands mid-pass is honored once that pass returns.
    ///
    /// The first failed pass ends the loop and its error is returned. Returns
    /// the number of completed passes otherwise.
    pub fn run<T, F>(&self, shutdown: &Receiver<()>, mut pass: F) -> Result<usize, Error>
    where
        F: FnMut() -> Result<T, Error>,
    {
        let mut completed = 0usize;
        loop {
            let started = Instant::now();
            if let Err(e) = pass() {
                error!("Pass {} failed: {}", completed + 1, e);
                return Err(e);
            }
            completed += 1;
            info!("Pass {} finished in {:.2?}", completed, started.elapsed());

            info!("Sleeping for {:?}", self.interval);
            select! {
                recv(shutdown) -> _ => {
                    info!("Shutdown requested, stopping after {} passes", completed);
                    return Ok(completed);
                }
                recv(after(self.interval)) -> _ => {}
            }
        }
    }
}
