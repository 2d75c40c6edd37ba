//! Cooperative interruption of strategy loops
//!
//! Strategy drivers sleep between rounds through [`InterruptSignal::pause`].
//! Firing the paired [`Interrupter`] (the CLI does so on Ctrl-C) wakes every
//! pending pause early; the driver then stops its loop and returns what it
//! has collected so far.

use std::time::Duration;
use tokio::sync::watch;

/// How a pause ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pause {
    Elapsed,
    Interrupted,
}

/// Sending half: fires the interruption
#[derive(Debug)]
pub struct Interrupter {
    tx: watch::Sender<bool>,
}

/// Receiving half, cloned into every driver that should observe it
#[derive(Clone, Debug)]
pub struct InterruptSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected interrupter/signal pair
pub fn interrupt_channel() -> (Interrupter, InterruptSignal) {
    let (tx, rx) = watch::channel(false);
    (Interrupter { tx }, InterruptSignal { rx })
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> InterruptSignal {
        InterruptSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl InterruptSignal {
    /// A signal nobody can fire
    pub fn never() -> Self {
        let (_, signal) = interrupt_channel();
        signal
    }

    pub fn is_interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once interrupted; pends forever if the interrupter is gone
    pub async fn interrupted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless interrupted first
    pub async fn pause(&self, duration: Duration) -> Pause {
        if self.is_interrupted() {
            return Pause::Interrupted;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Pause::Elapsed,
            _ = self.interrupted() => Pause::Interrupted,
        }
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_pause_elapses() {
        let signal = InterruptSignal::never();
        let start = Instant::now();
        assert_eq!(signal.pause(Duration::from_secs(3)).await, Pause::Elapsed);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_wakes_pause_early() {
        let (interrupter, signal) = interrupt_channel();
        let start = Instant::now();

        let pause = tokio::spawn(async move { signal.pause(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        interrupter.interrupt();

        assert_eq!(pause.await.unwrap(), Pause::Interrupted);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_interrupted_signal_short_circuits() {
        let (interrupter, signal) = interrupt_channel();
        interrupter.interrupt();
        assert!(signal.is_interrupted());
        assert!(interrupter.signal().is_interrupted());
        assert_eq!(signal.pause(Duration::from_secs(3600)).await, Pause::Interrupted);
    }
}
