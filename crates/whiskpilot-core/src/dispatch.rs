//! Ordered delivery of deferred run events.
//!
//! Download requests are held back by a short debounce. Run completion goes
//! through the same queue so a `RunCompleted` is never emitted ahead of a
//! download that was attributed before it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::correlator::Attribution;
use crate::events::AutomationEvent;
use crate::state::{RunContext, RunOutcome};

#[derive(Debug)]
enum Deferred {
    Download { attribution: Attribution, due: Instant },
    Complete { total_prompts: usize },
}

/// Producer side of a run's deferred-event queue.
///
/// The draining task exits once every clone has been dropped.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<Deferred>,
}

impl Dispatcher {
    pub(crate) fn spawn(ctx: Arc<RunContext>, generation: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(ctx, generation, rx));
        Self { tx }
    }

    /// Emit `DownloadRequested` for `attribution` once `due` is reached.
    pub(crate) fn download(&self, attribution: Attribution, due: Instant) {
        let _ = self.tx.send(Deferred::Download { attribution, due });
    }

    /// Finalize the run as completed after everything queued before it.
    pub(crate) fn complete(&self, total_prompts: usize) {
        let _ = self.tx.send(Deferred::Complete { total_prompts });
    }
}

async fn drain(ctx: Arc<RunContext>, generation: u64, mut rx: mpsc::UnboundedReceiver<Deferred>) {
    while let Some(item) = rx.recv().await {
        match item {
            // Still delivered after a stop: the image was already attributed.
            Deferred::Download { attribution, due } => {
                tokio::time::sleep_until(due).await;
                debug!("Requesting download of {}", attribution.url);
                ctx.events().emit(AutomationEvent::DownloadRequested {
                    url: attribution.url,
                    prompt: attribution.prompt,
                });
            }
            Deferred::Complete { total_prompts } => {
                ctx.finalize(Some(generation), RunOutcome::Completed { total_prompts });
            }
        }
    }
    debug!("Dispatcher for run generation {} drained", generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::events::EventSink;
    use crate::state::{RunConfig, RunPhase};

    fn attribution(url: &str, prompt: &str) -> Attribution {
        Attribution {
            url: url.to_string(),
            prompt: prompt.to_string(),
            prompt_index: Some(0),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_waits_for_queued_downloads() {
        let (sink, mut rx) = EventSink::channel();
        let ctx = Arc::new(RunContext::new(sink));
        let (generation, _) = ctx
            .begin(Arc::new(RunConfig::new(vec!["a".to_string()])))
            .unwrap();

        let dispatcher = Dispatcher::spawn(ctx.clone(), generation);
        let due = Instant::now() + Duration::from_millis(500);
        dispatcher.download(attribution("blob:1", "a"), due);
        dispatcher.complete(1);
        drop(dispatcher);

        assert_eq!(
            rx.recv().await.unwrap(),
            AutomationEvent::DownloadRequested {
                url: "blob:1".to_string(),
                prompt: "a".to_string()
            }
        );
        assert!(Instant::now() >= due);
        assert_eq!(
            rx.recv().await.unwrap(),
            AutomationEvent::RunCompleted { total_prompts: 1 }
        );
        assert_eq!(ctx.phase(), RunPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_downloads_delivered_after_stop() {
        let (sink, mut rx) = EventSink::channel();
        let ctx = Arc::new(RunContext::new(sink));
        let (generation, _) = ctx
            .begin(Arc::new(RunConfig::new(vec!["a".to_string()])))
            .unwrap();

        let dispatcher = Dispatcher::spawn(ctx.clone(), generation);
        dispatcher.download(
            attribution("blob:1", "a"),
            Instant::now() + Duration::from_millis(500),
        );
        ctx.finalize(None, RunOutcome::Stopped);
        dispatcher.complete(1);
        drop(dispatcher);

        assert!(matches!(
            rx.recv().await.unwrap(),
            AutomationEvent::StatusUpdate { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            AutomationEvent::DownloadRequested { .. }
        ));
        // The completion belongs to a finalized run and is dropped.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(ctx.last_outcome(), Some(RunOutcome::Stopped));
    }
}
