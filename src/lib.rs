//! File upload service backed by a hash-linked integrity ledger.
//!
//! Every upload is registered as a [`model::Block`] whose hash covers its
//! index, timestamp, file record and the previous block's hash. The chain is
//! persisted as one JSON file ([`storage`]) and checked with
//! [`model::Ledger::validate`] before any entry is trusted.

pub mod config;
pub mod crypto;
pub mod error;
pub mod model;
pub mod routes;
pub mod storage;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub use error::{ChainFault, LedgerError};
pub use model::{Block, Ledger, Record};

/// Shared application state passed to Axum handlers.
///
/// The ledger has a single writer: every handler that mutates it holds the
/// mutex across append/repair/reset, validation and the save that follows.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Mutex<Ledger>>,
    pub ledger_path: PathBuf,
    pub upload_dir: PathBuf,
}
