//! In-page mutation observer and the decoding of its reports.
//!
//! The script watches `document.body` for inserted and removed nodes and
//! reports every batch through a `Runtime.addBinding` function. Each report is
//! a JSON [`MutationBatch`].

use tracing::warn;
use whiskpilot_core::MutationBatch;

use crate::protocol::CdpResponse;

/// Name of the binding function the observer calls.
pub const BINDING_NAME: &str = "__whiskpilotMutation";

/// Installs a single `MutationObserver` per document.
pub const OBSERVER_SCRIPT: &str = r#"(() => {
  if (window.__whiskpilotObserver) return;
  const install = () => {
    const observer = new MutationObserver((mutations) => {
      const added = [];
      let removed = 0;
      for (const mutation of mutations) {
        removed += mutation.removedNodes.length;
        for (const node of mutation.addedNodes) {
          if (node.nodeType !== 1) continue;
          const images = node.matches('img') ? [node] : Array.from(node.querySelectorAll('img'));
          added.push({
            tag: node.tagName.toLowerCase(),
            imageSources: images.map((img) => img.src).filter((src) => !!src),
          });
        }
      }
      if (added.length === 0 && removed === 0) return;
      try {
        window.__whiskpilotMutation(JSON.stringify({ added, removed }));
      } catch (e) {}
    });
    observer.observe(document.body, { childList: true, subtree: true });
    window.__whiskpilotObserver = observer;
  };
  if (document.body) {
    install();
  } else {
    document.addEventListener('DOMContentLoaded', install, { once: true });
  }
})();"#;

/// Decode a `Runtime.bindingCalled` event coming from the observer.
///
/// Returns `None` for any other message.
pub fn parse_binding_event(event: &CdpResponse) -> Option<MutationBatch> {
    if !event.is_event("Runtime.bindingCalled") {
        return None;
    }
    let params = event.params.as_ref()?;
    if params["name"].as_str() != Some(BINDING_NAME) {
        return None;
    }

    let payload = params["payload"].as_str()?;
    match serde_json::from_str(payload) {
        Ok(batch) => Some(batch),
        Err(e) => {
            warn!("Malformed mutation report: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding_event(name: &str, payload: &str) -> CdpResponse {
        serde_json::from_value(json!({
            "method": "Runtime.bindingCalled",
            "params": {"name": name, "payload": payload, "executionContextId": 1},
            "sessionId": "S1"
        }))
        .unwrap()
    }

    #[test]
    fn test_script_calls_binding() {
        assert!(OBSERVER_SCRIPT.contains(&format!("window.{}(", BINDING_NAME)));
        assert!(OBSERVER_SCRIPT.contains("subtree: true"));
    }

    #[test]
    fn test_parse_image_batch() {
        let event = binding_event(
            BINDING_NAME,
            r#"{"added":[{"tag":"div","imageSources":["blob:https://labs.google/1"]}],"removed":2}"#,
        );
        let batch = parse_binding_event(&event).unwrap();
        assert_eq!(batch.removed, 2);
        assert_eq!(
            batch.image_sources().collect::<Vec<_>>(),
            vec!["blob:https://labs.google/1"]
        );
    }

    #[test]
    fn test_parse_ignores_other_bindings() {
        let event = binding_event("somethingElse", r#"{"added":[],"removed":1}"#);
        assert!(parse_binding_event(&event).is_none());
    }

    #[test]
    fn test_parse_ignores_other_events() {
        let event: CdpResponse = serde_json::from_value(json!({
            "method": "Page.loadEventFired",
            "params": {"timestamp": 1.0}
        }))
        .unwrap();
        assert!(parse_binding_event(&event).is_none());
    }

    #[test]
    fn test_parse_malformed_payload() {
        let event = binding_event(BINDING_NAME, "not json");
        assert!(parse_binding_event(&event).is_none());
    }
}
