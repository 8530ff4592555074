//! Cooperative cancellation for a run.

use std::time::Duration;

use tokio::sync::watch;

/// Raised at a suspension point once the run has been asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Owner side: flips the run into the stopped state.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Run side: checked at the top of each step and raced against every sleep.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    /// Request the stop. Calling it again has no further effect.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_stopped() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once a stop is requested (or the handle is gone).
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep unless a stop arrives first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.check()?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.stopped() => Err(Cancelled),
        }
    }
}
