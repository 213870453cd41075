//! `baseapp` is the deterministic core of a replicated application: it sits
//! between a Byzantine-fault-tolerant consensus engine and the application's
//! business-logic handlers, drives consensus lifecycle calls (init chain,
//! begin block, check/deliver tx, end block, commit, query) against a
//! versioned multi-store, enforces gas budgets at transaction and block
//! scope, and sandboxes speculative execution behind layered caches that
//! are flushed on success and discarded on failure.
//!
//! ## Getting started
//!
//! ```rust
//! use baseapp::app::AppBuilder;
//! use baseapp::error::Error;
//! use baseapp::storage::memory::MemDb;
//! use baseapp::storage::StoreKey;
//! use baseapp::types::{BlockHeader, RequestBeginBlock};
//!
//! fn main() {
//!     run().unwrap();
//! }
//!
//! fn run() -> Result<(), Error> {
//!     let db = MemDb::new();
//!     let main_key = StoreKey::new("main");
//!
//!     let mut app = AppBuilder::new("demo", db)
//!         .with_tx_decoder(Box::new(|_bytes| {
//!             Err(Error::TxDecode("demo accepts no transactions".to_string()))
//!         }))
//!         .mount_store(&main_key)
//!         .load_latest_version()?;
//!
//!     // An empty block still advances the committed version.
//!     let header = BlockHeader { chain_id: "demo".to_string(), height: 1, time: 0 };
//!     app.begin_block(RequestBeginBlock { header })?;
//!     let commit = app.commit();
//!     assert!(!commit.data.is_empty());
//!     assert_eq!(app.last_commit_id().version, 1);
//!
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod codec;
pub mod error;
pub mod gas;
pub mod router;
pub mod storage;
pub mod types;
