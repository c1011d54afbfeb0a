//! Run configuration and the shared per-run state.
//!
//! [`RunContext`] is the single owner of the mutable run state. The sequencer
//! and the correlator share it through an `Arc`; the lock is never held
//! across an `.await`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;
use whiskpilot_config::AutomationSettings;

use crate::error::{AutomationError, AutomationResult};
use crate::events::{AutomationEvent, EventSink, StatusKind};

// ============================================================================
// RunConfig
// ============================================================================

/// Immutable description of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub prompts: Vec<String>,
    pub delay: Duration,
    pub images_per_prompt: u32,
    pub randomize: bool,
    pub aspect_ratios: Vec<String>,
}

impl RunConfig {
    pub fn new(prompts: Vec<String>) -> Self {
        Self {
            prompts,
            delay: Duration::from_secs(20),
            images_per_prompt: 2,
            randomize: false,
            aspect_ratios: Vec::new(),
        }
    }

    /// Build from persisted settings and an already resolved prompt list.
    pub fn from_settings(prompts: Vec<String>, settings: &AutomationSettings) -> Self {
        Self {
            prompts,
            delay: Duration::from_secs(settings.delay_seconds),
            images_per_prompt: settings.images_per_prompt,
            randomize: settings.randomize,
            aspect_ratios: settings.aspect_ratios.clone(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_images_per_prompt(mut self, images: u32) -> Self {
        self.images_per_prompt = images;
        self
    }

    pub fn with_randomized_ratios<I, S>(mut self, ratios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.randomize = true;
        self.aspect_ratios = ratios.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> AutomationResult<()> {
        if self.prompts.is_empty() {
            return Err(AutomationError::InvalidConfig(
                "add at least one prompt".to_string(),
            ));
        }
        if self.images_per_prompt == 0 {
            return Err(AutomationError::InvalidConfig(
                "images_per_prompt must be at least 1".to_string(),
            ));
        }
        if self.randomize && self.aspect_ratios.is_empty() {
            return Err(AutomationError::InvalidConfig(
                "select at least one aspect ratio to randomize".to_string(),
            ));
        }
        Ok(())
    }

    /// Draw a uniformly random aspect ratio when randomization is on.
    pub fn pick_ratio<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        if !self.randomize {
            return None;
        }
        self.aspect_ratios.choose(rng).cloned()
    }
}

// ============================================================================
// RunState
// ============================================================================

/// Mutable state of the active run.
#[derive(Debug)]
pub struct RunState {
    pub run_id: Uuid,
    pub config: Arc<RunConfig>,
    /// Index of the next prompt to submit.
    pub current_index: usize,
    pub images_found: u32,
    pub awaiting_image: bool,
    pub last_submit_at: Option<Instant>,
    pub started_at: Instant,
    /// Cancels the scheduled cycle and the run's subscriptions.
    cancel: CancellationToken,
}

impl RunState {
    fn new(config: Arc<RunConfig>, cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            current_index: 0,
            images_found: 0,
            awaiting_image: false,
            last_submit_at: None,
            started_at: Instant::now(),
            cancel,
        }
    }

    pub fn total_prompts(&self) -> usize {
        self.config.prompts.len()
    }

    /// Open the wait gate for the prompt about to be submitted.
    pub(crate) fn begin_cycle(&mut self) {
        self.awaiting_image = true;
        self.images_found = 0;
        self.last_submit_at = Some(Instant::now());
    }

    /// The most recently submitted prompt.
    pub fn submitted_prompt(&self) -> Option<&str> {
        self.current_index
            .checked_sub(1)
            .and_then(|i| self.config.prompts.get(i))
            .map(String::as_str)
    }

    pub fn is_last_prompt_submitted(&self) -> bool {
        self.current_index >= self.total_prompts()
    }

    pub fn quota_met(&self) -> bool {
        self.images_found >= self.config.images_per_prompt
    }
}

/// Image identifiers already attributed during the current run.
#[derive(Debug, Default)]
pub struct SeenImageSet {
    urls: HashSet<String>,
}

impl SeenImageSet {
    /// Record `url`; false when it was already present.
    pub fn insert(&mut self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn clear(&mut self) {
        self.urls.clear();
    }
}

// ============================================================================
// RunContext
// ============================================================================

/// Lifecycle phase of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { total_prompts: usize },
    Stopped,
    Failed { error: String },
}

/// Answer to a state query from a late-joining observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    pub running: bool,
    pub current_index: usize,
    pub total_prompts: usize,
}

#[derive(Debug, Default)]
struct RunInner {
    /// Bumped on every start so work from a finished run cannot touch a newer one.
    generation: u64,
    run: Option<RunState>,
    seen: SeenImageSet,
    last_outcome: Option<RunOutcome>,
}

/// Shared run state plus the event sink it reports through.
#[derive(Debug)]
pub struct RunContext {
    inner: Mutex<RunInner>,
    events: EventSink,
}

impl RunContext {
    pub fn new(events: EventSink) -> Self {
        Self {
            inner: Mutex::new(RunInner::default()),
            events,
        }
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn phase(&self) -> RunPhase {
        if self.inner.lock().run.is_some() {
            RunPhase::Running
        } else {
            RunPhase::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == RunPhase::Running
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.inner.lock().last_outcome.clone()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let inner = self.inner.lock();
        match inner.run {
            Some(ref run) => RunSnapshot {
                running: true,
                current_index: run.current_index,
                total_prompts: run.total_prompts(),
            },
            None => RunSnapshot {
                running: false,
                current_index: 0,
                total_prompts: 0,
            },
        }
    }

    pub fn seen_count(&self) -> usize {
        self.inner.lock().seen.len()
    }

    /// Transition `Idle → Running`.
    pub(crate) fn begin(&self, config: Arc<RunConfig>) -> AutomationResult<(u64, CancellationToken)> {
        let mut inner = self.inner.lock();
        if inner.run.is_some() {
            return Err(AutomationError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        inner.generation += 1;
        inner.seen.clear();
        inner.run = Some(RunState::new(config, token.clone()));
        Ok((inner.generation, token))
    }

    /// Run `f` against the state of run `generation`, if it is still active.
    pub(crate) fn with_run<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut RunState, &mut SeenImageSet) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }
        let RunInner { run, seen, .. } = &mut *inner;
        run.as_mut().map(|run| f(run, seen))
    }

    /// End the run `generation` (or whatever run is active when `None`).
    ///
    /// Cancels pending work, clears per-run state and emits exactly one
    /// notification. Returns false when there was nothing to finalize.
    pub(crate) fn finalize(&self, generation: Option<u64>, outcome: RunOutcome) -> bool {
        let run = {
            let mut inner = self.inner.lock();
            if generation.is_some_and(|g| g != inner.generation) {
                return false;
            }
            let Some(run) = inner.run.take() else {
                return false;
            };
            inner.seen.clear();
            inner.last_outcome = Some(outcome.clone());
            run
        };

        run.cancel.cancel();
        info!(
            run_id = %run.run_id,
            elapsed_secs = run.started_at.elapsed().as_secs(),
            submitted = run.current_index,
            "Run finished: {:?}",
            outcome
        );

        let event = match outcome {
            RunOutcome::Completed { total_prompts } => AutomationEvent::RunCompleted { total_prompts },
            RunOutcome::Failed { error } => AutomationEvent::RunFailed { error },
            RunOutcome::Stopped => AutomationEvent::status("Automation stopped", StatusKind::Stopped),
        };
        self.events.emit(event);
        true
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
