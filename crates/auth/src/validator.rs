use crate::{Authenticator, ClientCredentials, Result};

use eh_scope::ScopeCache;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChainValidatorSettings {
	/// Require a resolvable auth chain and accept credentials of the relaying edge hub.
	pub nested_edge_enabled: bool,
	/// Let a module authenticate with the credentials of its device.
	pub allow_device_auth_for_module: bool,
	pub fallback_to_underlying: bool,
}

impl Default for AuthChainValidatorSettings {
	fn default() -> Self {
		Self {
			nested_edge_enabled: true,
			allow_device_auth_for_module: true,
			fallback_to_underlying: true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
	Authenticated,
	Denied,
	NotInScope,
}

/// Authenticates clients against the identities in scope of the actor device.
///
/// Clients the scope cache has never heard of are handed to the underlying authenticator.
/// Identities found in scope are decided here, a denial is final.
pub struct AuthChainValidator {
	cache: Arc<ScopeCache>,
	underlying: Option<Arc<dyn Authenticator>>,
	settings: AuthChainValidatorSettings,
}

impl AuthChainValidator {
	pub fn new(
		cache: Arc<ScopeCache>,
		underlying: Option<Arc<dyn Authenticator>>,
		settings: AuthChainValidatorSettings,
	) -> Self {
		Self {
			cache,
			underlying,
			settings,
		}
	}

	#[instrument(skip(self, credentials), fields(id = %credentials.identity()))]
	async fn authenticate_client(
		&self,
		credentials: &ClientCredentials,
		reauthenticate: bool,
	) -> Result<bool> {
		if !credentials.has_valid_shape() {
			debug!("Rejecting credentials with an invalid shape");
			return Ok(false);
		}

		let verdict = self.scope_verdict(credentials).await.unwrap_or_else(|e| {
			warn!(?e, "Failed to authenticate from scope;");
			Verdict::NotInScope
		});

		match verdict {
			Verdict::Authenticated => {
				debug!("Client authenticated from scope");
				Ok(true)
			}
			Verdict::Denied => {
				debug!("Client denied by scope");
				Ok(false)
			}
			Verdict::NotInScope => self.fall_back(credentials, reauthenticate).await,
		}
	}

	async fn fall_back(
		&self,
		credentials: &ClientCredentials,
		reauthenticate: bool,
	) -> Result<bool> {
		let Some(underlying) = self
			.underlying
			.as_ref()
			.filter(|_| self.settings.fallback_to_underlying)
		else {
			debug!("Client not in scope and no fallback authenticator");
			return Ok(false);
		};

		debug!("Client not in scope, using the underlying authenticator");

		if reauthenticate {
			underlying.reauthenticate(credentials).await
		} else {
			underlying.authenticate(credentials).await
		}
	}

	async fn scope_verdict(&self, credentials: &ClientCredentials) -> Result<Verdict> {
		let identity = credentials.identity();
		let verdict = self.target_verdict(identity.id(), credentials).await?;

		if verdict == Verdict::Authenticated
			|| !identity.is_module()
			|| !self.settings.allow_device_auth_for_module
		{
			return Ok(verdict);
		}

		let device_verdict = self
			.target_verdict(identity.device_id(), credentials)
			.await?;

		Ok(match (verdict, device_verdict) {
			(_, Verdict::Authenticated) => Verdict::Authenticated,
			(Verdict::NotInScope, Verdict::NotInScope) => Verdict::NotInScope,
			_ => Verdict::Denied,
		})
	}

	/// Validates against the cached identity, refreshing it once on a miss.
	async fn target_verdict(
		&self,
		target_id: &str,
		credentials: &ClientCredentials,
	) -> Result<Verdict> {
		let verdict = self.cached_verdict(target_id, credentials).await;
		if verdict == Verdict::Authenticated {
			return Ok(verdict);
		}

		debug!(%target_id, ?verdict, "Validation missed, refreshing identity");

		if let Err(e) = self.cache.refresh_service_identity(target_id).await {
			// Only an identity we know nothing about may go on to the fallback
			if verdict == Verdict::NotInScope {
				return Err(e.into());
			}

			warn!(%target_id, ?e, "Failed to refresh identity, keeping the cached verdict;");
			return Ok(verdict);
		}

		Ok(self.cached_verdict(target_id, credentials).await)
	}

	async fn cached_verdict(&self, target_id: &str, credentials: &ClientCredentials) -> Verdict {
		let Some(identity) = self.cache.get_service_identity(target_id).await else {
			return Verdict::NotInScope;
		};

		if !identity.is_enabled() {
			return Verdict::Denied;
		}

		let now = Utc::now();

		if !self.settings.nested_edge_enabled {
			return if credentials.matches(&identity, now) {
				Verdict::Authenticated
			} else {
				Verdict::Denied
			};
		}

		let Some(auth_chain) = self.cache.get_auth_chain(target_id).await else {
			debug!(%target_id, "Identity has no auth chain");
			return Verdict::Denied;
		};

		if credentials.matches(&identity, now) {
			return Verdict::Authenticated;
		}

		// On behalf of: the closest edge hub presents its own credentials for a nested identity
		if let Some(relay_id) = auth_chain.relaying_hub() {
			if let Some(relay) = self.cache.get_service_identity(relay_id).await {
				if relay.is_enabled() && credentials.matches(&relay, now) {
					debug!(%target_id, %relay_id, "Authenticated on behalf of the relaying hub");
					return Verdict::Authenticated;
				}
			}
		}

		Verdict::Denied
	}
}

#[async_trait]
impl Authenticator for AuthChainValidator {
	async fn authenticate(&self, credentials: &ClientCredentials) -> Result<bool> {
		self.authenticate_client(credentials, false).await
	}

	async fn reauthenticate(&self, credentials: &ClientCredentials) -> Result<bool> {
		self.authenticate_client(credentials, true).await
	}
}
