//! URL shortening on top of the storage layer.
//!
//! Single URLs go through the counter, the encoder and the record store in
//! that order; batches do the same inside one unit of work.

pub mod error;
pub mod service;

pub use error::ShortenerError;
pub use service::{
    BatchEntry, BatchItem, BatchOutcome, BatchPolicy, Shortened, ShortenerConfig,
    ShortenerService, DEFAULT_MAX_BATCH_SIZE,
};
