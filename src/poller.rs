use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::channels::UpdateSource;
use crate::dispatcher::Dispatcher;

/// Pause after a failed fetch before polling again.
const ERROR_DELAY: Duration = Duration::from_secs(5);

/// Pull events from `source` until `cancel` fires, spawning one dispatch task
/// per event on `tracker`.
///
/// Dispatch is fire-and-forget: the loop goes straight back to polling, and a
/// failed dispatch is only logged. Nothing is dispatched once `cancel` has
/// fired; events of the current batch left over at that point are handed back
/// to the source with [`UpdateSource::rewind`]. The caller owns `tracker` and
/// decides how long to wait for outstanding dispatches after this returns.
pub async fn run_poll_loop<S: UpdateSource>(
    mut source: S,
    dispatcher: Arc<Dispatcher>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    info!("Poll loop started ({})", source.name());

    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = source.next_batch() => batch,
        };

        let events = match batch {
            Ok(events) => events,
            Err(e) => {
                warn!("Polling {} failed: {e}", source.name());
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_DELAY) => {}
                }
                continue;
            }
        };

        let total = events.len();
        for (i, event) in events.into_iter().enumerate() {
            if cancel.is_cancelled() {
                let unhandled = total - i;
                debug!("Shutdown began, leaving {unhandled} event(s) for redelivery");
                source.rewind(unhandled);
                break;
            }
            let dispatcher = dispatcher.clone();
            tracker.spawn(async move {
                let chat_id = event.chat_id();
                let kind = event.kind();
                if let Err(e) = dispatcher.handle(event).await {
                    error!("Failed to handle {kind} in chat {chat_id}: {e}");
                }
            });
        }
    }

    info!("Poll loop shutting down");
    if let Err(e) = source.stop().await {
        warn!("Failed to stop {}: {e}", source.name());
    }
}
