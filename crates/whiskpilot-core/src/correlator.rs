//! Attribution of freshly rendered images to the prompt that produced them.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::mutation::{MutationBatch, MutationSubscription};
use crate::settings::Timings;
use crate::state::RunContext;

/// Prompt label used when an image shows up before anything was submitted.
pub const UNKNOWN_PROMPT: &str = "unknown_prompt";

/// Generated images are exposed to the page as object URLs.
const BLOB_PREFIX: &str = "blob:";

/// One image assigned to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub url: String,
    pub prompt: String,
    /// Index of the prompt, `None` for [`UNKNOWN_PROMPT`].
    pub prompt_index: Option<usize>,
}

/// Outcome of feeding one mutation batch through the correlator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub attributions: Vec<Attribution>,
    /// The last prompt reached its quota with this batch.
    pub run_finished: bool,
    pub total_prompts: usize,
}

/// Watches DOM mutations during a run and attributes new images.
#[derive(Debug, Clone)]
pub struct Correlator {
    ctx: Arc<RunContext>,
    timings: Timings,
}

impl Correlator {
    pub fn new(ctx: Arc<RunContext>, timings: Timings) -> Self {
        Self { ctx, timings }
    }

    /// Apply `batch` to run `generation`, updating the counters and seen set.
    ///
    /// Returns nothing when the run is gone, is not waiting for an image, or
    /// the last submission is older than the staleness window. In the last
    /// case the wait gate is closed.
    pub fn correlate(&self, generation: u64, batch: &MutationBatch) -> Correlation {
        let staleness = self.timings.staleness;

        self.ctx
            .with_run(generation, |run, seen| {
                let mut correlation = Correlation {
                    total_prompts: run.total_prompts(),
                    ..Default::default()
                };

                if !run.awaiting_image {
                    return correlation;
                }

                if let Some(submitted) = run.last_submit_at {
                    if submitted.elapsed() > staleness {
                        info!(
                            run_id = %run.run_id,
                            "No image within {:?} of the last submission, no longer waiting",
                            staleness
                        );
                        run.awaiting_image = false;
                        return correlation;
                    }
                }

                for url in batch.image_sources() {
                    if !url.starts_with(BLOB_PREFIX) || seen.contains(url) {
                        continue;
                    }
                    if run.quota_met() {
                        break;
                    }

                    seen.insert(url);
                    run.images_found += 1;

                    let prompt_index = run.current_index.checked_sub(1);
                    let prompt = run.submitted_prompt().unwrap_or(UNKNOWN_PROMPT).to_string();
                    debug!(
                        "Image {}/{} for prompt {:?}: {}",
                        run.images_found, run.config.images_per_prompt, prompt_index, url
                    );
                    correlation.attributions.push(Attribution {
                        url: url.to_string(),
                        prompt,
                        prompt_index,
                    });

                    if run.quota_met() {
                        run.awaiting_image = false;
                        info!(
                            run_id = %run.run_id,
                            "All {} images found for this prompt",
                            run.config.images_per_prompt
                        );
                        correlation.run_finished = run.is_last_prompt_submitted();
                    }
                }

                correlation
            })
            .unwrap_or_default()
    }

    /// Consume mutations for run `generation` until it is cancelled.
    pub(crate) async fn watch(
        &self,
        mut subscription: MutationSubscription,
        generation: u64,
        cancel: CancellationToken,
        dispatcher: Dispatcher,
    ) {
        debug!("Correlator watching run generation {}", generation);
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = subscription.recv() => match batch {
                    Some(batch) => batch,
                    None => {
                        warn!("Mutation feed closed, no more images will be detected");
                        break;
                    }
                },
            };

            let correlation = self.correlate(generation, &batch);
            if correlation.attributions.is_empty() && !correlation.run_finished {
                continue;
            }

            let due = Instant::now() + self.timings.download_debounce;
            for attribution in correlation.attributions {
                dispatcher.download(attribution, due);
            }
            if correlation.run_finished {
                dispatcher.complete(correlation.total_prompts);
            }
        }
        debug!("Correlator for run generation {} stopped", generation);
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
