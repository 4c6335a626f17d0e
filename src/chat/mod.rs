//! Chat synchronization engine.
//!
//! Turns a tag stream on the community site into a paced, indefinitely
//! running stream of chat messages. The pipeline for one [`Session`]:
//!
//! ```text
//! locate ─► EntrySource ─► parse + Merger ─► bounded queue ─► pacer ─► Session
//!           (api | scrape)   (watermark)      (poll task)     (task)
//! ```
//!
//! - [`locator`]: chat URL → [`FeedTarget`]
//! - [`credentials`]: bearer token for the API backend
//! - [`source`]: the [`EntrySource`] seam and its two backends
//! - [`parser`]: raw entry → [`Message`]
//! - [`merger`]: watermark, dedup and ordering
//!
//! # Example
//!
//! ```no_run
//! use tagchat::chat::Session;
//! use tagchat::config::ChatConfig;
//!
//! # async fn run() -> Result<(), tagchat::chat::ChatError> {
//! let mut session = Session::start(
//!     "https://wykop.pl/tag/mecz/wszystkie",
//!     &ChatConfig::default(),
//!     reqwest::Client::new(),
//! )
//! .await?;
//!
//! while let Some(message) = session.recv().await {
//!     println!("{}: {}", message.author, message.text.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod credentials;
mod error;
pub mod locator;
pub mod markup;
pub mod merger;
mod message;
mod pacer;
pub mod parser;
mod scheduler;
mod session;
pub mod source;

pub use error::ChatError;
pub use locator::{locate, FeedTarget};
pub use merger::Merger;
pub use message::{FeedKind, Message, RawEntry};
pub use parser::LinkStyle;
pub use session::Session;
pub use source::{ApiSource, BatchOrder, Cursor, CursorKind, EntrySource, ScrapeSource};
