use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Unexpected authentication failures. A client that simply isn't authenticated is `Ok(false)`.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Scope(#[from] eh_scope::Error),
	#[error("underlying authenticator failed: {0}")]
	Underlying(String),
}
