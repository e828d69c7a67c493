use crate::{ClientCredentials, Result};

use async_trait::async_trait;

#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
	async fn authenticate(&self, credentials: &ClientCredentials) -> Result<bool>;

	/// Checks an already authenticated client again, implementations may settle for a cheaper
	/// check than [`Authenticator::authenticate`].
	async fn reauthenticate(&self, credentials: &ClientCredentials) -> Result<bool>;
}
