//! # board-content
//!
//! Content-addressed object storage for meshboard.
//!
//! Media attachments and the canonical JSON copies of posts live in a
//! content-addressed store: bytes go in, an immutable identifier comes out.
//!
//! - [`ContentStore`] - put/get bytes, best-effort pin
//! - [`ContentStoreExt`] - JSON documents on top of any store
//! - [`HttpContentStore`] - a content node's HTTP RPC API, optional pinning service
//! - [`MemoryContentStore`] - in-process store for tests
//! - [`PinLedger`] - last pin outcome per identifier
//!
//! ## Example
//!
//! ```rust,ignore
//! use meshboard_content::{ContentStore, ContentStoreExt, MemoryContentStore, PutOptions};
//!
//! # async fn example() -> Result<(), meshboard_content::ContentError> {
//! let store = MemoryContentStore::new();
//! let cid = store.put_bytes(b"hello", PutOptions::default()).await?;
//! assert_eq!(store.get_bytes(&cid).await?, b"hello");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod http;
mod ledger;
mod store;

pub use error::ContentError;
pub use http::{pin_outcome, HttpContentStore, PinningService, PAID_FEATURE_ONLY};
pub use ledger::PinLedger;
pub use store::{memory_cid, ContentStore, ContentStoreExt, MemoryContentStore, PinOutcome, PutOptions};
