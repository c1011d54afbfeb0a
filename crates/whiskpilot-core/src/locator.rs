//! Waiting for an element to appear.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{AutomationError, AutomationResult, PageError};
use crate::page::{ElementHandle, Page};

/// Resolve `selector`, waiting up to `timeout` for it to appear.
///
/// Matches immediately when the element is already present. Otherwise the
/// selector is re-tested on every structural DOM change until it matches or
/// the window closes. The mutation subscription lives only for the duration
/// of the call.
pub async fn locate<P: Page + ?Sized>(
    page: &P,
    selector: &str,
    timeout: Duration,
) -> AutomationResult<ElementHandle> {
    if let Some(element) = page.query_selector(selector).await? {
        return Ok(element);
    }

    let deadline = Instant::now() + timeout;
    let mut subscription = page.subscribe();
    debug!("Waiting up to {:?} for '{}'", timeout, selector);

    loop {
        // Re-test first: the element may have been inserted before the subscription existed.
        if let Some(element) = page.query_selector(selector).await? {
            return Ok(element);
        }

        match tokio::time::timeout_at(deadline, subscription.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) => return Err(PageError::Detached.into()),
            Err(_) => {
                debug!("Timed out waiting for '{}'", selector);
                return Err(AutomationError::not_found(selector));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;

    #[tokio::test(start_paused = true)]
    async fn test_locate_existing_element() {
        let page = FakePage::new();
        let textarea = page.add(&["textarea"], "");

        let found = locate(page.as_ref(), "textarea", Duration::from_secs(1)).await.unwrap();
        assert_eq!(found, textarea);
        assert_eq!(page.feed().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_waits_for_insertion() {
        let page = FakePage::new();
        let inserter = page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            inserter.insert(&["#late"], "");
        });

        let start = Instant::now();
        let found = locate(page.as_ref(), "#late", Duration::from_secs(10)).await;
        assert!(found.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(page.feed().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_ignores_unrelated_mutations() {
        let page = FakePage::new();
        let noisy = page.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                noisy.insert(&["div"], "");
            }
        });

        let result = locate(page.as_ref(), "#never", Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(AutomationError::NotFound { ref selector }) if selector == "#never"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_timeout_unsubscribes() {
        let page = FakePage::new();
        let start = Instant::now();

        let result = locate(page.as_ref(), "#missing", Duration::from_secs(10)).await;
        assert!(matches!(result, Err(AutomationError::NotFound { .. })));
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(page.feed().subscriber_count(), 0);
    }
}
