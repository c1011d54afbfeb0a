//! In-memory page used by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::PageError;
use crate::mutation::{AddedNode, MutationBatch, MutationFeed, MutationSubscription};
use crate::page::{ElementHandle, Page};
use crate::settings::Selectors;

/// Side effect of clicking a fake element.
#[derive(Debug, Clone)]
pub(crate) enum ClickEffect {
    /// Flip visibility of the given elements.
    Toggle(Vec<ElementHandle>),
    /// Remove the element from the document.
    Hide(ElementHandle),
    /// Render `images` fresh blob images after a delay.
    Render { images: usize, after: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PageAction {
    Fill {
        element: ElementHandle,
        value: String,
        at: Instant,
    },
    Click {
        element: ElementHandle,
        at: Instant,
    },
}

#[derive(Debug)]
struct FakeElement {
    handle: ElementHandle,
    selectors: Vec<String>,
    text: String,
    value: String,
    disabled: bool,
    visible: bool,
    on_click: Vec<ClickEffect>,
}

#[derive(Debug, Default)]
struct FakeDom {
    elements: Vec<FakeElement>,
    actions: Vec<PageAction>,
    next_id: u64,
    next_image: u64,
    releases: usize,
}

impl FakeDom {
    fn element_mut(&mut self, handle: &ElementHandle) -> Result<&mut FakeElement, PageError> {
        self.elements
            .iter_mut()
            .find(|e| &e.handle == handle)
            .ok_or_else(|| PageError::StaleElement(handle.id().to_string()))
    }
}

/// A DOM made of flat elements that match selectors by exact string.
#[derive(Debug, Default)]
pub(crate) struct FakePage {
    dom: Mutex<FakeDom>,
    feed: MutationFeed,
}

impl FakePage {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn feed(&self) -> &MutationFeed {
        &self.feed
    }

    fn push(&self, selectors: &[&str], text: &str, visible: bool) -> ElementHandle {
        let mut dom = self.dom.lock();
        dom.next_id += 1;
        let handle = ElementHandle::new(format!("fake-{}", dom.next_id));
        dom.elements.push(FakeElement {
            handle: handle.clone(),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            text: text.to_string(),
            value: String::new(),
            disabled: false,
            visible,
            on_click: Vec::new(),
        });
        handle
    }

    /// Add a visible element without notifying observers.
    pub(crate) fn add(&self, selectors: &[&str], text: &str) -> ElementHandle {
        self.push(selectors, text, true)
    }

    pub(crate) fn add_hidden(&self, selectors: &[&str], text: &str) -> ElementHandle {
        self.push(selectors, text, false)
    }

    /// Add a visible element and publish the insertion.
    pub(crate) fn insert(&self, selectors: &[&str], text: &str) -> ElementHandle {
        let handle = self.push(selectors, text, true);
        self.feed.publish(MutationBatch {
            added: vec![AddedNode::element(selectors.first().copied().unwrap_or("div"))],
            removed: 0,
        });
        handle
    }

    pub(crate) fn set_disabled(&self, handle: &ElementHandle, disabled: bool) {
        if let Ok(element) = self.dom.lock().element_mut(handle) {
            element.disabled = disabled;
        }
    }

    pub(crate) fn on_click(&self, handle: &ElementHandle, effect: ClickEffect) {
        if let Ok(element) = self.dom.lock().element_mut(handle) {
            element.on_click.push(effect);
        }
    }

    pub(crate) fn publish_images(&self, sources: &[&str]) {
        self.feed.publish(MutationBatch::images(sources.iter().copied()));
    }

    /// How many times handles were released.
    pub(crate) fn release_count(&self) -> usize {
        self.dom.lock().releases
    }

    pub(crate) fn actions(&self) -> Vec<PageAction> {
        self.dom.lock().actions.clone()
    }

    /// Values filled into any element, in order.
    pub(crate) fn filled_values(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PageAction::Fill { value, .. } => Some(value),
                _ => None,
            })
            .collect()
    }

    /// When `handle` was clicked.
    pub(crate) fn clicks_on(&self, handle: &ElementHandle) -> Vec<Instant> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PageAction::Click { element, at } if &element == handle => Some(at),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn value_of(&self, handle: &ElementHandle) -> String {
        self.dom
            .lock()
            .element_mut(handle)
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }

    fn render(&self, images: usize, after: Duration) {
        let sources: Vec<String> = {
            let mut dom = self.dom.lock();
            (0..images)
                .map(|_| {
                    dom.next_image += 1;
                    format!("blob:https://labs.google/generated-{}", dom.next_image)
                })
                .collect()
        };
        let feed = self.feed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            feed.publish(MutationBatch::images(sources));
        });
    }
}

#[async_trait]
impl Page for FakePage {
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, PageError> {
        Ok(self.query_selector_all(selector).await?.into_iter().next())
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        let dom = self.dom.lock();
        Ok(dom
            .elements
            .iter()
            .filter(|e| e.visible && e.selectors.iter().any(|s| s == selector))
            .map(|e| e.handle.clone())
            .collect())
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<String, PageError> {
        Ok(self.dom.lock().element_mut(element)?.text.clone())
    }

    async fn is_disabled(&self, element: &ElementHandle) -> Result<bool, PageError> {
        Ok(self.dom.lock().element_mut(element)?.disabled)
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), PageError> {
        let mut dom = self.dom.lock();
        dom.element_mut(element)?.value = value.to_string();
        dom.actions.push(PageAction::Fill {
            element: element.clone(),
            value: value.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        let effects = {
            let mut dom = self.dom.lock();
            let effects = dom.element_mut(element)?.on_click.clone();
            dom.actions.push(PageAction::Click {
                element: element.clone(),
                at: Instant::now(),
            });
            for effect in &effects {
                match effect {
                    ClickEffect::Toggle(targets) => {
                        for target in targets {
                            let target = dom.element_mut(target)?;
                            target.visible = !target.visible;
                        }
                    }
                    ClickEffect::Hide(target) => dom.element_mut(target)?.visible = false,
                    ClickEffect::Render { .. } => {}
                }
            }
            effects
        };

        for effect in effects {
            match effect {
                ClickEffect::Toggle(targets) => {
                    self.feed.publish(MutationBatch {
                        added: targets.iter().map(|_| AddedNode::element("button")).collect(),
                        removed: 0,
                    });
                }
                ClickEffect::Hide(_) => {
                    self.feed.publish(MutationBatch {
                        added: Vec::new(),
                        removed: 1,
                    });
                }
                ClickEffect::Render { images, after } => self.render(images, after),
            }
        }
        Ok(())
    }

    async fn release_handles(&self) -> Result<(), PageError> {
        self.dom.lock().releases += 1;
        Ok(())
    }

    fn subscribe(&self) -> MutationSubscription {
        self.feed.subscribe()
    }
}

/// A fake Whisk page wired the way the real one behaves.
pub(crate) struct WhiskFixture {
    pub page: Arc<FakePage>,
    pub textarea: ElementHandle,
    pub submit: ElementHandle,
    pub ratio_button: ElementHandle,
    pub ratio_options: Vec<ElementHandle>,
}

/// Build a page whose submit button renders `images_per_submit` images after `render_after`.
pub(crate) fn whisk_page(images_per_submit: usize, render_after: Duration) -> WhiskFixture {
    let selectors = Selectors::default();
    let page = FakePage::new();

    let textarea = page.add(&[selectors.prompt_input.as_str()], "");
    let ratio_button = page.add(&[selectors.button.as_str()], "aspect_ratio\n1:1");
    let ratio_options: Vec<ElementHandle> = ["1:1", "9:16", "16:9"]
        .iter()
        .map(|label| page.add_hidden(&[selectors.button.as_str()], &format!(" {} ", label)))
        .collect();
    let menu_ready = page.add_hidden(&[selectors.ratio_menu_ready.as_str()], "");
    let submit = page.add(
        &[selectors.submit_button.as_str(), selectors.button.as_str()],
        "arrow_forward",
    );

    let mut menu = ratio_options.clone();
    menu.push(menu_ready);
    page.on_click(&ratio_button, ClickEffect::Toggle(menu));
    if images_per_submit > 0 {
        page.on_click(
            &submit,
            ClickEffect::Render {
                images: images_per_submit,
                after: render_after,
            },
        );
    }

    WhiskFixture {
        page,
        textarea,
        submit,
        ratio_button,
        ratio_options,
    }
}
