//! Common types module for the Starknet OCR2 relayer.
//!
//! This module defines the data types shared by the codec, transaction manager
//! and contract cache crates. It provides a centralized location for felt
//! helpers and OCR2 records so that every component agrees on their encoding.

/// Field element helpers and conversions.
pub mod felt;
/// OCR2 contract configuration and transmission records.
pub mod ocr2;
/// Secure string handling for signing keys.
pub mod secret_string;
/// Transaction and transaction lifecycle types.
pub mod transaction;
/// Utility functions for formatting and scheduling.
pub mod utils;

// Re-export all types for convenient access
pub use felt::*;
pub use ocr2::*;
pub use secret_string::SecretString;
pub use transaction::*;
pub use utils::{truncate_id, with_0x_prefix, with_jitter, without_0x_prefix};
