//! # whiskpilot Core
//!
//! Automation state machine for submitting a sequence of prompts into the
//! Whisk image generator and collecting the images it renders.
//!
//! ## Architecture
//!
//! ```text
//!  start(config) ──► Sequencer ──► Submitter ──► Locator ──► Page (trait)
//!                        ▲                                     │
//!                        │ finalize                            │ DOM mutations
//!                        │                                     ▼
//!                    RunContext ◄──────── Correlator ◄──── MutationFeed
//!                        │
//!                        └──► EventSink (status, downloads, completion)
//! ```
//!
//! The page is reached only through the [`Page`] trait, so the same state
//! machine runs against a live browser tab or an in-memory fake.
//!
//! ## Key Components
//!
//! - [`locate`]: waits for a selector, re-testing on every DOM mutation
//! - [`Submitter`]: fills the prompt, optionally picks an aspect ratio, submits
//! - [`Correlator`]: attributes newly rendered images to the submitted prompt
//! - [`Sequencer`]: owns the run lifecycle (`Idle → Running → Idle`)
//! - [`RetryPolicy`]: bounded retry with linear backoff
//! - [`DownloadSaver`]: writes attributed images to disk

mod correlator;
mod dispatch;
mod download;
mod error;
mod events;
mod locator;
mod mutation;
mod page;
mod retry;
mod sequencer;
mod settings;
mod state;
mod submitter;

#[cfg(test)]
mod testing;

pub use correlator::{Attribution, Correlation, Correlator, UNKNOWN_PROMPT};
pub use download::{
    DownloadError, DownloadSaver, ResourceFetcher, SavedImage, download_filename, sanitize_prompt,
};
pub use error::{AutomationError, AutomationResult, PageError};
pub use events::{AutomationEvent, EventSink, StatusKind};
pub use locator::locate;
pub use mutation::{AddedNode, MutationBatch, MutationFeed, MutationSubscription};
pub use page::{ElementHandle, Page};
pub use retry::RetryPolicy;
pub use sequencer::Sequencer;
pub use settings::{Selectors, Timings};
pub use state::{RunConfig, RunContext, RunOutcome, RunPhase, RunSnapshot, RunState, SeenImageSet};
pub use submitter::Submitter;
