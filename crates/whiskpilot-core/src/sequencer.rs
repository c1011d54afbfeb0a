//! Run lifecycle: `Idle → Running → {Completed, Stopped, Failed} → Idle`.
//!
//! [`Sequencer::start`] spawns two tasks per run. The driver walks the
//! prompt list one cycle at a time; the correlator watches DOM mutations.
//! Both share the [`RunContext`] and stop when the run's cancellation token
//! fires, which every finalization does.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::correlator::Correlator;
use crate::dispatch::Dispatcher;
use crate::error::{AutomationError, AutomationResult};
use crate::events::{AutomationEvent, EventSink, StatusKind};
use crate::page::Page;
use crate::settings::{Selectors, Timings};
use crate::state::{RunConfig, RunContext, RunOutcome, RunSnapshot};
use crate::submitter::Submitter;

/// Characters of the prompt shown in progress updates.
const PREVIEW_CHARS: usize = 30;

/// Owns the automation state machine for one page.
pub struct Sequencer<P: ?Sized> {
    page: Arc<P>,
    ctx: Arc<RunContext>,
    selectors: Selectors,
    timings: Timings,
}

impl<P: Page + ?Sized + 'static> Sequencer<P> {
    pub fn new(page: Arc<P>, events: EventSink, selectors: Selectors, timings: Timings) -> Self {
        Self {
            page,
            ctx: Arc::new(RunContext::new(events)),
            selectors,
            timings,
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.ctx.snapshot()
    }

    /// Start a run. Must be called from within a tokio runtime.
    ///
    /// Fails with [`AutomationError::AlreadyRunning`] without touching the
    /// active run, or with [`AutomationError::InvalidConfig`].
    pub fn start(&self, config: RunConfig) -> AutomationResult<()> {
        if self.ctx.is_running() {
            return Err(AutomationError::AlreadyRunning);
        }
        config.validate()?;

        let config = Arc::new(config);
        let (generation, cancel) = self.ctx.begin(config.clone())?;
        info!(
            "Starting run: {} prompts, {:?} delay, {} images per prompt, randomize={}",
            config.prompts.len(),
            config.delay,
            config.images_per_prompt,
            config.randomize
        );

        // Subscribe before anything is submitted so no render is missed.
        let subscription = self.page.subscribe();
        let dispatcher = Dispatcher::spawn(self.ctx.clone(), generation);

        let correlator = Correlator::new(self.ctx.clone(), self.timings.clone());
        let watch_cancel = cancel.clone();
        let watch_dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            correlator
                .watch(subscription, generation, watch_cancel, watch_dispatcher)
                .await
        });

        let driver = RunDriver {
            submitter: Submitter::new(
                self.page.clone(),
                self.selectors.clone(),
                self.timings.clone(),
            ),
            ctx: self.ctx.clone(),
            config,
            timings: self.timings.clone(),
            generation,
            cancel,
            dispatcher,
        };
        tokio::spawn(driver.run());

        Ok(())
    }

    /// Stop the active run. Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        let stopped = self.ctx.finalize(None, RunOutcome::Stopped);
        if stopped {
            info!("Automation stopped by request");
        }
        stopped
    }
}

enum CycleEnd {
    /// More prompts remain.
    Next,
    /// The last prompt was submitted and its images are still outstanding.
    AwaitFinal,
    /// The run is over or no longer ours.
    Done,
}

struct RunDriver<P: ?Sized> {
    submitter: Submitter<P>,
    ctx: Arc<RunContext>,
    config: Arc<RunConfig>,
    timings: Timings,
    generation: u64,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
}

impl<P: Page + ?Sized> RunDriver<P> {
    async fn run(self) {
        loop {
            match self.cycle().await {
                CycleEnd::Next => {
                    if !self.pause(self.config.delay).await {
                        return;
                    }
                }
                CycleEnd::AwaitFinal => {
                    self.await_final_image().await;
                    return;
                }
                CycleEnd::Done => return,
            }
        }
    }

    async fn cycle(&self) -> CycleEnd {
        let Some(index) = self.ctx.with_run(self.generation, |run, _| run.current_index) else {
            return CycleEnd::Done;
        };
        let total = self.config.prompts.len();
        if index >= total {
            self.dispatcher.complete(total);
            return CycleEnd::Done;
        }
        let prompt = self.config.prompts[index].as_str();

        let ratio = {
            let mut rng = rand::thread_rng();
            self.config.pick_ratio(&mut rng)
        };
        if let Some(ref label) = ratio {
            self.emit(AutomationEvent::status(
                format!("Picked aspect ratio: {}", label),
                StatusKind::Info,
            ));
        }
        self.emit(AutomationEvent::progress(
            format!("Submitting: \"{}...\"", preview(prompt)),
            format!("Prompt {} of {}", index + 1, total),
        ));

        if !self.pause(self.timings.status).await {
            return CycleEnd::Done;
        }
        if self
            .ctx
            .with_run(self.generation, |run, _| run.begin_cycle())
            .is_none()
        {
            return CycleEnd::Done;
        }

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return CycleEnd::Done,
            result = self.submitter.submit(prompt, ratio.as_deref()) => result,
        };

        if let Err(e) = result {
            error!("Prompt {} of {} failed: {}", index + 1, total, e);
            self.ctx.finalize(
                Some(self.generation),
                RunOutcome::Failed {
                    error: e.to_string(),
                },
            );
            return CycleEnd::Done;
        }

        let advanced = self.ctx.with_run(self.generation, |run, _| {
            run.current_index += 1;
            (run.is_last_prompt_submitted(), run.awaiting_image)
        });
        match advanced {
            None => CycleEnd::Done,
            Some((false, _)) => CycleEnd::Next,
            // Quota met before the index moved: nothing left to wait for.
            Some((true, false)) => {
                self.dispatcher.complete(total);
                CycleEnd::Done
            }
            Some((true, true)) => CycleEnd::AwaitFinal,
        }
    }

    /// Wait for the correlator to finish the run, forcing completion once
    /// the staleness window after the last submission has passed.
    async fn await_final_image(&self) {
        self.emit(AutomationEvent::status(
            "Waiting for the final image...",
            StatusKind::Running,
        ));

        let deadline = self
            .ctx
            .with_run(self.generation, |run, _| run.last_submit_at)
            .flatten()
            .map(|submitted| submitted + self.timings.staleness);
        let Some(deadline) = deadline else {
            return;
        };

        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let still_waiting = self.ctx.with_run(self.generation, |run, _| {
            std::mem::replace(&mut run.awaiting_image, false)
        });
        match still_waiting {
            None => return,
            Some(true) => {
                warn!(
                    "No image for the final prompt after {:?}, finishing the run",
                    self.timings.staleness
                );
                self.emit(AutomationEvent::status(
                    "Final image not detected in time, finishing",
                    StatusKind::Warning,
                ));
            }
            Some(false) => {}
        }
        self.dispatcher.complete(self.config.prompts.len());
    }

    /// Sleep unless the run is cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn emit(&self, event: AutomationEvent) {
        self.ctx.events().emit(event);
    }
}

fn preview(prompt: &str) -> String {
    prompt.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
#[path = "sequencer_tests.rs"]
mod tests;
