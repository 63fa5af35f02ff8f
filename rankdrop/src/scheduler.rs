//! Background trigger for automatic resets.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use crate::error::{ArchiveError, Result};

/// Runs a tick function on a dedicated thread at a fixed interval.
///
/// The first tick runs one interval after [`ResetScheduler::spawn`]. Dropping
/// the scheduler stops the thread and waits for an in-flight tick to finish.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
/// use rankdrop::scheduler::ResetScheduler;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ticks = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&ticks);
/// let scheduler = ResetScheduler::spawn(Duration::from_millis(10), move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// })?;
/// std::thread::sleep(Duration::from_millis(50));
/// scheduler.stop();
/// assert!(ticks.load(Ordering::SeqCst) > 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResetScheduler {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ResetScheduler {
    /// Starts the scheduler thread.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::SchedulerSpawn`] if the thread cannot be
    /// created.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("rankdrop-reset".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => tick(),
                        // Explicit stop or the scheduler was dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("reset scheduler stopped");
            })
            .map_err(|e| ArchiveError::SchedulerSpawn { source: e })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let scheduler = ResetScheduler::spawn(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 3);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_drop_stops_promptly() {
        let scheduler = ResetScheduler::spawn(Duration::from_secs(3600), || {}).unwrap();
        let started = Instant::now();
        drop(scheduler);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
