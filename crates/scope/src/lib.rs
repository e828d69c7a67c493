//! Keeps the identity hierarchy of an edge device in sync with the upstream identity authority.
//!
//! The [`ScopeCache`] pages through every identity in scope on a fixed cadence (or on demand),
//! refreshes single identities when asked, persists what it learned in an encrypted local store so
//! restarts work without network access, and tells registered hooks about identity churn.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod cache;
mod error;
mod hooks;
mod proxy;
mod refresh_handler;
mod store;

pub use cache::{ScopeCache, ScopeCacheSettings};
pub use error::{Error, Result};
pub use hooks::{HookId, ScopeEvent};
pub use proxy::{
	DeviceScopeApiClient, PagedIdentitiesIterator, ScopeResult, ServiceIdentitiesIterator,
	ServiceProxy,
};
pub use refresh_handler::{RefreshRequest, RefreshRequestHandler, RefreshResponse};
pub use store::{
	EncryptedStore, FileIOError, FileStore, IdentityStore, KeyValueStore, MemoryStore,
	PersistedRecord, StoreError, STORE_KEY_LEN,
};
