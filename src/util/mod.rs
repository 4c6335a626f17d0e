//! Terminal text helpers used by the host binary.

mod text;

pub use text::{display_width, fit_to_width, strip_control_chars, truncate_to_width};
