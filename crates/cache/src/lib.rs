//! On-disk content cache.
//!
//! Raw payloads are stored verbatim next to a small JSON metadata record
//! holding the server's modification marker. Freshness is plain equality
//! of that marker: whenever it changes (in either direction) or is missing,
//! the caller re-fetches and overwrites via [`ContentStore::put`].
//!
//! The cache root is always injected; nothing here reads global state.

mod entry;
pub mod error;
mod store;

pub use crate::entry::CacheEntry;
pub use crate::store::ContentStore;
