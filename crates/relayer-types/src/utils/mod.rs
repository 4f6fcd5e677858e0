//! Utility functions shared across the relayer crates.

pub mod formatting;
pub mod time;

pub use formatting::{truncate_id, with_0x_prefix, without_0x_prefix};
pub use time::with_jitter;
