//! Document readiness and script injection.

use std::time::Duration;

use serde_json::json;

use crate::error::CdpError;

use super::core::PageSession;

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const LOAD_POLL: Duration = Duration::from_millis(100);

impl PageSession {
    /// Wait until `document.readyState` is `interactive` or `complete`.
    pub async fn wait_for_load(&self) -> Result<(), CdpError> {
        let deadline = tokio::time::Instant::now() + LOAD_TIMEOUT;

        loop {
            let state = self.evaluate("document.readyState").await?;
            if matches!(state.as_str(), Some("interactive" | "complete")) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CdpError::Timeout(format!(
                    "document still {} after {}s",
                    state,
                    LOAD_TIMEOUT.as_secs()
                )));
            }
            tokio::time::sleep(LOAD_POLL).await;
        }
    }

    /// Run `source` in every document the tab loads from now on. Returns the
    /// script identifier.
    pub async fn add_script_on_new_document(&self, source: &str) -> Result<String, CdpError> {
        let result = self
            .call(
                "Page.addScriptToEvaluateOnNewDocument",
                Some(json!({ "source": source })),
            )
            .await?;

        Ok(result["identifier"].as_str().unwrap_or_default().to_string())
    }

    pub async fn get_url(&self) -> Result<String, CdpError> {
        let href = self.evaluate("window.location.href").await?;
        Ok(href.as_str().unwrap_or_default().to_string())
    }
}
