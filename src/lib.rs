//! vidseek - multimodal video retrieval
//!
//! Video records are embedded into a shared vector space and searched with
//! any mix of text, document and image queries.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod record;
pub mod search;
pub mod storage;

#[doc(hidden)]
pub mod test_utils;

pub use error::{Result, SeekError};
