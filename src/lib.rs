#![recursion_limit = "256"]
//! A browser-automation engine speaking the [Chrome DevTools Protocol](https://chromedevtools.github.io/devtools-protocol/)
//! over one multiplexed WebSocket.
//!
//! The engine tracks frame topology and session ownership across target
//! attach/detach (including out-of-process iframes), resolves selectors
//! through iframe and open/closed shadow-DOM boundaries, synthesizes mouse
//! and keyboard input, coordinates navigation with network quiescence, and
//! produces a cross-frame hybrid DOM + accessibility snapshot keyed by
//! `EncodedId`s.
//!
//! # Example
//! ```no_run
//! use futures::StreamExt;
//! use deepdriver::{Browser, BrowserConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (browser, mut handler) =
//!         Browser::launch(BrowserConfig::builder().build()?).await?;
//!
//!     let handle = tokio::task::spawn(async move {
//!         while let Some(event) = handler.next().await {
//!             if event.is_err() {
//!                 break;
//!             }
//!         }
//!     });
//!
//!     let page = browser.new_page("https://en.wikipedia.org").await?;
//!
//!     // selectors resolve through iframes and shadow roots alike
//!     page.locator("input#searchInput").click().await?;
//!     page.type_str("Rust programming language", Default::default())
//!         .await?
//!         .key_press("Enter")
//!         .await?;
//!
//!     let snapshot = page.capture_hybrid_snapshot(Default::default()).await?;
//!     println!("{}", snapshot.combined_tree);
//!
//!     let _ = handle.await;
//!     Ok(())
//! }
//! ```

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod browser;
pub(crate) mod cmd;
pub mod conn;
pub mod detection;
pub mod element;
pub mod error;
pub mod frame;
pub mod handler;
pub(crate) mod javascript;
pub mod js;
pub mod keys;
pub mod layout;
pub mod listeners;
pub mod locator;
pub mod page;
pub mod snapshot;
pub mod utils;

pub use crate::browser::{Browser, BrowserConfig, HeadlessMode};
pub use crate::conn::Connection;
pub use crate::element::Element;
pub use crate::error::{CdpError, Result};
pub use crate::frame::Frame;
pub use crate::handler::frame::{LifecycleEvent, NavigationOptions};
pub use crate::handler::Handler;
pub use crate::locator::Locator;
pub use crate::page::Page;
pub use crate::snapshot::{HybridSnapshot, SnapshotOptions};

/// re-export the generated cdp types
pub use chromiumoxide_cdp::cdp;
pub use chromiumoxide_types::{self as types, Binary, Command, Method, MethodType};
