//! Chrome DevTools Protocol backend for whiskpilot.
//!
//! Attaches to an already open Whisk tab in a Chrome started with remote
//! debugging, installs a mutation observer in it and exposes the tab through
//! the core [`Page`](whiskpilot_core::Page) trait.
//!
//! ## Usage
//!
//! 1. Start Chrome with remote debugging and open Whisk:
//!    ```bash
//!    chrome --remote-debugging-port=9222 https://labs.google/fx/tools/whisk
//!    ```
//!
//! 2. Attach:
//!    ```rust,ignore
//!    let client = CdpClient::connect("http://localhost:9222").await?;
//!    let tab = client.find_page("labs.google").await?;
//!    let page = CdpPage::attach(client.attach_page(&tab.id).await?).await?;
//!    ```

mod client;
mod error;
mod observer;
mod page;
mod protocol;
mod session;

pub use client::{CdpClient, select_page};
pub use error::CdpError;
pub use observer::{BINDING_NAME, OBSERVER_SCRIPT, parse_binding_event};
pub use page::CdpPage;
pub use protocol::*;
pub use session::PageSession;
