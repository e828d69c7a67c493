use crate::ConnectionManager;

use eh_auth::{Authenticator, CredentialsCache};
use eh_scope::{ScopeCache, ScopeEvent};

use std::sync::Arc;

use tokio::{spawn, task::JoinHandle};
use tracing::{debug, info, warn};

/// Keeps live connections in line with the identities in scope: a changed identity has its client
/// authenticated again, a client that fails it or whose identity left the scope is disconnected.
pub struct ScopeChangeListener {
	manager: Arc<ConnectionManager>,
	authenticator: Arc<dyn Authenticator>,
	credentials: Arc<dyn CredentialsCache>,
}

impl ScopeChangeListener {
	pub fn new(
		manager: Arc<ConnectionManager>,
		authenticator: Arc<dyn Authenticator>,
		credentials: Arc<dyn CredentialsCache>,
	) -> Self {
		Self {
			manager,
			authenticator,
			credentials,
		}
	}

	/// Hooks the listener onto `cache`. The task ends, unregistering the hook, once the cache
	/// stops delivering events or the handle is aborted.
	pub fn spawn(self, cache: &Arc<ScopeCache>) -> JoinHandle<()> {
		let (tx, rx) = flume::unbounded();
		let hook_id = cache.register_hook("scope-change-listener", tx);
		let cache = Arc::downgrade(cache);

		spawn(async move {
			while let Ok(event) = rx.recv_async().await {
				self.handle_event(event).await;
			}

			if let Some(cache) = cache.upgrade() {
				cache.unregister_hook(hook_id);
			}
		})
	}

	pub async fn handle_event(&self, event: ScopeEvent) {
		match event {
			ScopeEvent::IdentityUpdated(identity) => {
				let id = identity.id();
				if self.manager.is_connected(id) {
					self.reauthenticate(id).await;
				}
			}

			ScopeEvent::IdentityRemoved(id) => {
				if self.manager.is_connected(&id) {
					info!(%id, "Identity left the scope, disconnecting it");
					self.manager.remove_device_connection(&id, true).await;
				}
			}

			ScopeEvent::IdentitiesUpdated(ids) => {
				debug!(in_scope = ids.len(), "Scope refreshed");
			}
		}
	}

	async fn reauthenticate(&self, id: &str) {
		let authenticated = match self.credentials.get(id).await {
			Some(credentials) => self
				.authenticator
				.reauthenticate(&credentials)
				.await
				.unwrap_or_else(|e| {
					warn!(%id, ?e, "Failed to reauthenticate client;");
					false
				}),
			None => {
				debug!(%id, "No cached credentials to reauthenticate client with");
				false
			}
		};

		if authenticated {
			debug!(%id, "Client reauthenticated after its identity changed");
		} else {
			info!(%id, "Client no longer authenticated, disconnecting it");
			self.manager.remove_device_connection(id, true).await;
		}
	}
}
