//! The DOM seam between the state machine and a browser tab.

use async_trait::async_trait;

use crate::error::PageError;
use crate::mutation::MutationSubscription;

/// Opaque reference to an element in the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Backend-specific identifier (a CDP remote object id, for instance).
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Operations the automation needs from the target page.
///
/// Selectors are CSS selectors evaluated against the whole document.
#[async_trait]
pub trait Page: Send + Sync {
    /// First element matching `selector`, if any.
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, PageError>;

    /// Every element matching `selector`, in document order.
    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError>;

    /// The element's `textContent`.
    async fn text_content(&self, element: &ElementHandle) -> Result<String, PageError>;

    /// Whether the element is a disabled form control.
    async fn is_disabled(&self, element: &ElementHandle) -> Result<bool, PageError>;

    /// Focus the element, set its value and dispatch bubbling `input` and
    /// `change` events so the page's reactive state picks the value up.
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), PageError>;

    /// Activate the element as a user click would.
    async fn click(&self, element: &ElementHandle) -> Result<(), PageError>;

    /// Drop backend references held for handles returned so far. Handles
    /// obtained before the call must not be used afterwards.
    async fn release_handles(&self) -> Result<(), PageError> {
        Ok(())
    }

    /// Subscribe to structural changes under `document.body`.
    ///
    /// Dropping the returned subscription unsubscribes.
    fn subscribe(&self) -> MutationSubscription;
}
