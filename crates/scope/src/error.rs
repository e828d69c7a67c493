use crate::StoreError;

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Terminal for the identity: it is disabled or no longer in scope, never retried.
	#[error("identity is in an invalid state <id='{id}'>: {reason}")]
	InvalidState { id: String, reason: String },
	#[error("upstream identity service failure: {0}")]
	Connection(String),
	#[error("timed out after {0:?} waiting for a scope cache refresh")]
	RefreshTimeout(Duration),
	#[error("scope cache was shut down")]
	Shutdown,

	#[error("failed to (de)serialize scope payload: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error(transparent)]
	Store(#[from] StoreError),
}
