//! One round of UI interaction: fill the prompt, pick a ratio, submit.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AutomationError, AutomationResult};
use crate::locator::locate;
use crate::page::{ElementHandle, Page};
use crate::settings::{Selectors, Timings};

/// Drives the Whisk prompt form.
pub struct Submitter<P: ?Sized> {
    page: Arc<P>,
    selectors: Selectors,
    timings: Timings,
}

impl<P: Page + ?Sized> Submitter<P> {
    pub fn new(page: Arc<P>, selectors: Selectors, timings: Timings) -> Self {
        Self {
            page,
            selectors,
            timings,
        }
    }

    /// Submit `prompt`, selecting `ratio` in the aspect-ratio menu first when given.
    ///
    /// Element handles taken during the round are released before returning,
    /// whatever the outcome.
    pub async fn submit(&self, prompt: &str, ratio: Option<&str>) -> AutomationResult<()> {
        let result = self.interact(prompt, ratio).await;
        if let Err(e) = self.page.release_handles().await {
            debug!("Releasing element handles failed: {}", e);
        }
        result
    }

    async fn interact(&self, prompt: &str, ratio: Option<&str>) -> AutomationResult<()> {
        self.fill_prompt(prompt).await?;

        if let Some(label) = ratio {
            self.select_ratio(label).await?;
        }

        self.click_submit().await
    }

    async fn fill_prompt(&self, prompt: &str) -> AutomationResult<()> {
        let input = locate(
            self.page.as_ref(),
            &self.selectors.prompt_input,
            self.timings.locate_timeout,
        )
        .await?;

        self.page.fill(&input, prompt).await?;
        debug!("Filled prompt ({} chars)", prompt.chars().count());

        // The page only enables its submit control after reacting to the input.
        tokio::time::sleep(self.timings.settle).await;
        Ok(())
    }

    async fn select_ratio(&self, label: &str) -> AutomationResult<()> {
        let marker = self.selectors.ratio_menu_marker.as_str();
        let opener = self
            .find_button(|text| text.contains(marker))
            .await?
            .ok_or_else(|| {
                AutomationError::submission(format!("aspect ratio button ('{}') not found", marker))
            })?;

        self.page.click(&opener).await?;
        tokio::time::sleep(self.timings.menu_open).await;

        locate(
            self.page.as_ref(),
            &self.selectors.ratio_menu_ready,
            self.timings.locate_timeout,
        )
        .await?;

        match self.find_button(|text| text.trim() == label).await? {
            Some(option) => {
                self.page.click(&option).await?;
                tokio::time::sleep(self.timings.menu_option).await;

                self.page.click(&opener).await?;
                tokio::time::sleep(self.timings.menu_option).await;
                debug!("Selected aspect ratio {}", label);
            }
            None => {
                warn!("Aspect ratio option '{}' not found, keeping the current one", label);
                self.page.click(&opener).await?;
            }
        }

        Ok(())
    }

    async fn click_submit(&self) -> AutomationResult<()> {
        let button = self
            .page
            .query_selector(&self.selectors.submit_button)
            .await?
            .ok_or_else(|| AutomationError::submission("submit button not found"))?;

        if self.page.is_disabled(&button).await? {
            return Err(AutomationError::submission("submit button is disabled"));
        }

        self.page.click(&button).await?;
        debug!("Prompt submitted");
        Ok(())
    }

    /// First button whose text satisfies `matches`.
    async fn find_button(
        &self,
        matches: impl Fn(&str) -> bool,
    ) -> AutomationResult<Option<ElementHandle>> {
        for button in self.page.query_selector_all(&self.selectors.button).await? {
            let text = self.page.text_content(&button).await?;
            if matches(&text) {
                return Ok(Some(button));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "submitter_tests.rs"]
mod tests;
