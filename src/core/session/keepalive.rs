//! Transport keep-alive
//!
//! A background task that queues a transport ping on every tick until its
//! token is cancelled. The session owns the handle and cancels it on its
//! first terminal transition.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::protocol::RelayRoute;

/// Handle to a running keep-alive task
#[derive(Debug)]
pub struct KeepAlive {
    token: CancellationToken,
}

impl KeepAlive {
    /// Spawn the ping loop. The first ping fires one `interval` after spawn.
    pub fn spawn(
        interval: Duration,
        outbound: mpsc::Sender<RelayRoute>,
        token: CancellationToken,
    ) -> Self {
        let task_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = task_token.cancelled() => break,

                    _ = ticker.tick() => {
                        if outbound.send(RelayRoute::Ping).await.is_err() {
                            debug!("Outbound channel closed, stopping keep-alive");
                            break;
                        }
                    }
                }
            }
        });

        Self { token }
    }

    /// Stop the ping loop. Safe to call more than once.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
