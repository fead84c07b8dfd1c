//! Periodic re-evaluation of root targets

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::KhError;
use crate::eval::{Evaluator, RootTarget};
use crate::status::ObjectStatus;

/// One batch of freshly evaluated statuses.
pub struct StatusUpdate {
    pub statuses: Vec<ObjectStatus>,
    pub error: Option<KhError>,
}

/// Re-evaluates the root targets at a fixed cadence and emits an update per
/// tick. Ticks are strictly serial; the evaluator cache is reset at each one
/// so every update reflects fresh cluster state.
pub struct StatusPoller {
    interval: Duration,
    targets: Vec<RootTarget>,
}

impl StatusPoller {
    pub fn new(interval: Duration, targets: Vec<RootTarget>) -> Self {
        StatusPoller { interval, targets }
    }

    /// Spawn the polling loop. The returned channel yields one update per
    /// tick and closes once the cancellation token fires.
    pub fn start(
        self,
        evaluator: Arc<Evaluator>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StatusUpdate> {
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                evaluator.reset().await;

                let mut statuses = Vec::new();
                let mut error = None;
                for target in &self.targets {
                    match evaluator.eval_target(target).await {
                        Ok(batch) => statuses.extend(batch),
                        Err(e) => {
                            if error.is_none() {
                                error = Some(e);
                            }
                        }
                    }
                }

                if tx.send(StatusUpdate { statuses, error }).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}
