use crate::Result;

use eh_identity::ServiceIdentity;

use std::sync::Arc;

use async_trait::async_trait;

/// One page of the upstream "identities in scope" listing.
#[derive(Debug, Clone, Default)]
pub struct ScopeResult {
	pub identities: Vec<ServiceIdentity>,
	/// Present while more pages are available.
	pub continuation_link: Option<String>,
}

/// Client of the upstream identity-scope authority.
#[async_trait]
pub trait DeviceScopeApiClient: Send + Sync + 'static {
	async fn get_identities_in_scope(&self, continuation_link: Option<String>)
		-> Result<ScopeResult>;

	/// Looks up a single identity. `on_behalf_of` names the edge device relaying the query for a
	/// nested identity. Identities outside of scope resolve to `Ok(None)`.
	async fn get_identity(
		&self,
		id: &str,
		on_behalf_of: Option<&str>,
	) -> Result<Option<ServiceIdentity>>;
}

#[async_trait]
pub trait ServiceIdentitiesIterator: Send {
	fn has_next(&self) -> bool;

	async fn get_next(&mut self) -> Result<Vec<ServiceIdentity>>;
}

#[derive(Clone)]
pub struct ServiceProxy {
	client: Arc<dyn DeviceScopeApiClient>,
}

impl ServiceProxy {
	pub fn new(client: Arc<dyn DeviceScopeApiClient>) -> Self {
		Self { client }
	}

	#[must_use]
	pub fn identities_iterator(&self) -> PagedIdentitiesIterator {
		PagedIdentitiesIterator {
			client: Arc::clone(&self.client),
			continuation_link: None,
			started: false,
		}
	}

	pub async fn get_service_identity(
		&self,
		id: &str,
		on_behalf_of: Option<&str>,
	) -> Result<Option<ServiceIdentity>> {
		self.client.get_identity(id, on_behalf_of).await
	}
}

/// Follows continuation links until the upstream listing is exhausted.
pub struct PagedIdentitiesIterator {
	client: Arc<dyn DeviceScopeApiClient>,
	continuation_link: Option<String>,
	started: bool,
}

#[async_trait]
impl ServiceIdentitiesIterator for PagedIdentitiesIterator {
	fn has_next(&self) -> bool {
		!self.started || self.continuation_link.is_some()
	}

	async fn get_next(&mut self) -> Result<Vec<ServiceIdentity>> {
		let ScopeResult {
			identities,
			continuation_link,
		} = self
			.client
			.get_identities_in_scope(self.continuation_link.clone())
			.await?;

		self.started = true;
		self.continuation_link = continuation_link;

		Ok(identities)
	}
}
