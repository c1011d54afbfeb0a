//! [`Page`] implementation backed by a CDP session.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use whiskpilot_core::{
    ElementHandle, MutationFeed, MutationSubscription, Page, PageError, ResourceFetcher,
};

use crate::error::CdpError;
use crate::observer::{BINDING_NAME, OBSERVER_SCRIPT, parse_binding_event};
use crate::protocol::{CdpResponse, RemoteObject};
use crate::session::PageSession;

/// Remote object group every element handle is created in.
const HANDLE_GROUP: &str = "whiskpilot-handles";

const TEXT_CONTENT_FN: &str = "function() { return this.textContent || ''; }";
const IS_DISABLED_FN: &str = "function() { return !!this.disabled; }";
const CLICK_FN: &str = "function() { this.click(); }";
const FILL_FN: &str = "function(value) {
  this.focus();
  this.value = value;
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
}";

/// Broadcast slot shared with the event pump. Emptied when the session ends.
type FeedSlot = Arc<Mutex<Option<MutationFeed>>>;

/// A live browser tab driven over CDP.
pub struct CdpPage {
    session: PageSession,
    feed: FeedSlot,
    pump: JoinHandle<()>,
}

impl CdpPage {
    /// Install the mutation observer in the tab and start relaying its reports.
    pub async fn attach(session: PageSession) -> Result<Self, CdpError> {
        let events = session
            .take_events()
            .ok_or_else(|| CdpError::InvalidResponse("session events already taken".to_string()))?;

        let feed: FeedSlot = Arc::new(Mutex::new(Some(MutationFeed::default())));
        let pump = tokio::spawn(pump_events(events, feed.clone()));

        session.add_binding(BINDING_NAME).await?;
        session.add_script_on_new_document(OBSERVER_SCRIPT).await?;
        session.wait_for_load().await?;
        session.evaluate(OBSERVER_SCRIPT).await?;

        let url = session.get_url().await.unwrap_or_default();
        info!("Mutation observer installed in {}", url);

        Ok(Self {
            session,
            feed,
            pump,
        })
    }

    pub fn session(&self) -> &PageSession {
        &self.session
    }

    async fn call_on(
        &self,
        element: &ElementHandle,
        function: &str,
        args: Option<Vec<serde_json::Value>>,
    ) -> Result<serde_json::Value, PageError> {
        Ok(self
            .session
            .call_function_on(element.id(), function, args)
            .await?)
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump_events(mut events: mpsc::UnboundedReceiver<CdpResponse>, slot: FeedSlot) {
    while let Some(event) = events.recv().await {
        if let Some(batch) = parse_binding_event(&event) {
            let feed = slot.lock().clone();
            if let Some(feed) = feed {
                feed.publish(batch);
            }
        }
    }

    debug!("Page event stream ended");
    // Dropping the last sender closes every subscription.
    slot.lock().take();
}

fn element_handle(object: RemoteObject) -> Result<Option<ElementHandle>, PageError> {
    if object.is_null() {
        return Ok(None);
    }
    object
        .object_id
        .map(|id| Some(ElementHandle::new(id)))
        .ok_or_else(|| PageError::Backend("element without an object id".to_string()))
}

fn query_expression(selector: &str) -> Result<String, PageError> {
    let literal = serde_json::to_string(selector).map_err(|e| PageError::Backend(e.to_string()))?;
    Ok(format!("document.querySelector({})", literal))
}

/// Script that fetches `url` inside the page and resolves to its bytes in base64.
fn fetch_expression(url: &str) -> Result<String, PageError> {
    let literal = serde_json::to_string(url).map_err(|e| PageError::Backend(e.to_string()))?;
    Ok(format!(
        r#"(async () => {{
  const response = await fetch({});
  if (!response.ok) throw new Error('HTTP ' + response.status);
  const bytes = new Uint8Array(await response.arrayBuffer());
  let binary = '';
  for (let i = 0; i < bytes.length; i += 0x8000) {{
    binary += String.fromCharCode.apply(null, bytes.subarray(i, i + 0x8000));
  }}
  return btoa(binary);
}})()"#,
        literal
    ))
}

#[async_trait]
impl Page for CdpPage {
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, PageError> {
        let object = self
            .session
            .evaluate_handle(&query_expression(selector)?, HANDLE_GROUP)
            .await?;
        element_handle(object)
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        let node_ids = self.session.query_selector_all(selector).await?;
        let mut handles = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let object = self.session.resolve_node(node_id, HANDLE_GROUP).await?;
            if let Some(handle) = element_handle(object)? {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<String, PageError> {
        let value = self.call_on(element, TEXT_CONTENT_FN, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_disabled(&self, element: &ElementHandle) -> Result<bool, PageError> {
        let value = self.call_on(element, IS_DISABLED_FN, None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), PageError> {
        self.call_on(element, FILL_FN, Some(vec![serde_json::Value::from(value)]))
            .await?;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.call_on(element, CLICK_FN, None).await?;
        Ok(())
    }

    async fn release_handles(&self) -> Result<(), PageError> {
        self.session.release_object_group(HANDLE_GROUP).await?;
        Ok(())
    }

    fn subscribe(&self) -> MutationSubscription {
        match self.feed.lock().as_ref() {
            Some(feed) => feed.subscribe(),
            // Detached: hand out a subscription that is already closed.
            None => MutationFeed::new(1).subscribe(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for CdpPage {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PageError> {
        let encoded = self.session.evaluate(&fetch_expression(url)?).await?;
        let encoded = encoded
            .as_str()
            .ok_or_else(|| PageError::Script(format!("fetch of {} returned no data", url)))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| PageError::Backend(format!("invalid base64 for {}: {}", url, e)))
    }
}
