//! Core types for the Burrow URL shortener.
//!
//! This crate provides the short code encoding, the stored record type and
//! the error kinds shared by the storage backends and the shortener service.

pub mod base58;
pub mod error;
pub mod record;
pub mod shortcode;

pub use base58::DEFAULT_CODE_LENGTH;
pub use error::{CoreError, ErrorKind, Result, StorageError};
pub use record::UrlRecord;
pub use shortcode::ShortCode;
