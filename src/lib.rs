//! Live tag-stream chat engine with a video stream resolver.
//!
//! - [`chat`]: polls a community site's tag stream and exposes it as a paced
//!   message stream
//! - [`video`]: resolves a video page into a playable HLS URL
//! - [`config`]: TOML configuration
//! - [`http`]: the shared, size-capped HTTP helpers

pub mod chat;
pub mod config;
pub mod http;
pub mod util;
pub mod video;
