//! DOM mutation notifications.
//!
//! A [`MutationFeed`] fans batches out to any number of independent
//! [`MutationSubscription`]s. The locator and the correlator each hold their
//! own subscription and drop it on every exit path, which unsubscribes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// An element inserted into the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedNode {
    /// Lower-case tag name.
    pub tag: String,

    /// `src` of the node itself when it is an `<img>`, otherwise of every
    /// `<img>` nested under it.
    #[serde(default)]
    pub image_sources: Vec<String>,
}

impl AddedNode {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            image_sources: Vec::new(),
        }
    }

    pub fn image(src: impl Into<String>) -> Self {
        Self {
            tag: "img".to_string(),
            image_sources: vec![src.into()],
        }
    }
}

/// One observer callback's worth of structural changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationBatch {
    #[serde(default)]
    pub added: Vec<AddedNode>,

    /// Number of nodes removed in this batch.
    #[serde(default)]
    pub removed: usize,
}

impl MutationBatch {
    /// A batch adding one `<img>` per source.
    pub fn images<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            added: sources.into_iter().map(AddedNode::image).collect(),
            removed: 0,
        }
    }

    /// Every image source in insertion order.
    pub fn image_sources(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .flat_map(|node| node.image_sources.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed == 0
    }
}

/// Broadcast hub for mutation batches coming out of a page.
#[derive(Debug, Clone)]
pub struct MutationFeed {
    tx: broadcast::Sender<Arc<MutationBatch>>,
}

impl MutationFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver a batch to every live subscription. Returns how many received it.
    pub fn publish(&self, batch: MutationBatch) -> usize {
        if batch.is_empty() {
            return 0;
        }
        self.tx.send(Arc::new(batch)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> MutationSubscription {
        MutationSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MutationFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A live subscription to a [`MutationFeed`].
#[derive(Debug)]
pub struct MutationSubscription {
    rx: broadcast::Receiver<Arc<MutationBatch>>,
}

impl MutationSubscription {
    /// Next batch, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<Arc<MutationBatch>> {
        loop {
            match self.rx.recv().await {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Mutation subscriber lagged, {} batches skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Mutation feed closed");
                    return None;
                }
            }
        }
    }
}
