//! Per-command timeout watchdog.
//!
//! Each dispatched command arms one watchdog. A sub-second tick
//! recomputes the time left from an absolute deadline, so the countdown
//! stays correct under event-loop jitter, and publishes it for
//! countdown observers. On reaching zero the watchdog fires exactly
//! once; a real response arriving first disarms it and suppresses the
//! expiry.

use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Countdown tick granularity.
pub const TICK: Duration = Duration::from_millis(250);

/// An armed countdown for one in-flight command.
///
/// Dropping the watchdog disarms it.
pub struct Watchdog {
    fired: oneshot::Receiver<()>,
    seconds_left: watch::Receiver<u64>,
    ticker: JoinHandle<()>,
}

impl Watchdog {
    /// Arm a countdown of `seconds`.
    pub fn arm(seconds: u64) -> Watchdog {
        let deadline = Instant::now() + Duration::from_secs(seconds);
        let (fire_tx, fired) = oneshot::channel();
        let (count_tx, seconds_left) = watch::channel(seconds);

        let ticker = tokio::spawn(async move {
            let mut tick = tokio::time::interval(TICK);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately.
            tick.tick().await;
            loop {
                tick.tick().await;
                let remaining = deadline.saturating_duration_since(Instant::now());
                let secs = remaining.as_secs()
                    + u64::from(remaining.subsec_nanos() > 0);
                let _ = count_tx.send(secs);
                if secs == 0 {
                    debug!("command timed out after {seconds}s");
                    let _ = fire_tx.send(());
                    return;
                }
            }
        });

        Watchdog {
            fired,
            seconds_left,
            ticker,
        }
    }

    /// Resolves when the countdown expires. Never resolves after a
    /// disarm; a disarmed watchdog's expiry simply pends forever, which
    /// lets this sit in a `select!` arm opposite the real response.
    pub async fn expired(&mut self) {
        if (&mut self.fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Observe the live seconds-remaining countdown.
    pub fn countdown(&self) -> watch::Receiver<u64> {
        self.seconds_left.clone()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}
