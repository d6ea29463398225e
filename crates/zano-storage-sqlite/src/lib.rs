//! SQLite storage for the Zano chain statistics indexer
//!
//! Holds the canonical chain copy (blocks, transactions) and the singleton
//! sync cursor row with its cached derived statistics.
//!
//! ## Write model
//!
//! - **Blocks / transactions**: bulk insert-ignore; existing rows always win
//! - **Cursor height**: advanced in place, never moved backwards except by
//!   an explicit resync
//! - **Derived stats**: partial single-row updates, disjoint from the height

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cursor;
pub mod database;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;

pub use cursor::{
    truncate_above_height, CursorStorage, BASE_BACKOFF_MS, CURSOR_ID, MAX_BACKOFF_MS,
    MAX_BUSY_RETRIES,
};
pub use database::Database;
pub use error::{Error, Result};
pub use models::*;
pub use repository::{BatchWriteResult, Repository};
