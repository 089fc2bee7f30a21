use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ClientResult;

/// Handle to a running poll loop. Dropping it stops the loop.
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait for the loop to exit, including any tick in progress.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct Poller;

impl Poller {
    /// Run `tick` immediately and then every `period` until the handle is
    /// dropped or `scope` is cancelled. Failed ticks are logged; the loop
    /// keeps going.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, scope: &CancellationToken, mut tick: F) -> PollHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ClientResult<()>> + Send + 'static,
    {
        let cancel = scope.child_token();
        let loop_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let result = tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    res = tick() => res,
                };

                match result {
                    Ok(()) => debug!("Poll {} tick ok", name),
                    Err(e) => warn!("Poll {} tick failed, retrying next tick: {}", name, e),
                }
            }
            debug!("Poll {} stopped", name);
        });

        PollHandle {
            cancel,
            task: Some(task),
        }
    }
}
