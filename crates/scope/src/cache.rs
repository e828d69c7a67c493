use crate::{
	hooks::Hook, Error, HookId, IdentityStore, KeyValueStore, Result, ScopeEvent,
	ServiceIdentitiesIterator, ServiceProxy,
};

use eh_identity::{AuthChain, AuthenticationType, IdentityHierarchy, ServiceIdentity};

use std::{
	collections::HashSet,
	future::Future,
	sync::{Arc, Mutex, PoisonError, RwLock},
	time::Duration,
};

use dashmap::DashMap;
use flume::Sender;
use stable_vec::StableVec;
use tokio::{
	select, spawn,
	sync::{watch, Notify},
	time::{sleep, timeout, Instant},
};
use tracing::{debug, error, info, instrument, warn};

const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
const TWO_MINUTES: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeCacheSettings {
	/// Period of the full refresh cycle.
	pub refresh_rate: Duration,
	/// Minimum delay between two targeted refreshes of one identity, and between two explicitly
	/// requested full refreshes.
	pub refresh_delay: Duration,
}

impl Default for ScopeCacheSettings {
	fn default() -> Self {
		Self {
			refresh_rate: ONE_HOUR,
			refresh_delay: TWO_MINUTES,
		}
	}
}

/// Owns the identity hierarchy of the actor device and keeps it in sync with the upstream
/// identity authority.
///
/// A background loop runs a full refresh right after the persisted snapshot is replayed, then
/// sleeps for [`ScopeCacheSettings::refresh_rate`] or until [`ScopeCache::initiate_cache_refresh`]
/// wakes it up, whichever comes first.
pub struct ScopeCache {
	hierarchy: Arc<dyn IdentityHierarchy>,
	proxy: ServiceProxy,
	store: IdentityStore,
	settings: ScopeCacheSettings,
	last_refreshed: DashMap<String, Instant>,
	last_full_refresh: Mutex<Option<Instant>>,
	refresh_requested: Arc<Notify>,
	/// Counts finished refresh cycles, waiters subscribe to its changes.
	refresh_completed: watch::Sender<u64>,
	hooks: RwLock<StableVec<Hook>>,
}

impl ScopeCache {
	pub async fn new(
		hierarchy: Arc<dyn IdentityHierarchy>,
		proxy: ServiceProxy,
		store: Arc<dyn KeyValueStore>,
		settings: ScopeCacheSettings,
	) -> Result<Arc<Self>> {
		let (refresh_completed, _) = watch::channel(0);

		let cache = Arc::new(Self {
			hierarchy,
			proxy,
			store: IdentityStore::new(store),
			settings,
			last_refreshed: DashMap::new(),
			last_full_refresh: Mutex::new(None),
			refresh_requested: Arc::new(Notify::new()),
			refresh_completed,
			hooks: RwLock::default(),
		});

		cache.replay_persisted().await?;
		cache.start_refresh_loop();

		Ok(cache)
	}

	pub fn actor_device_id(&self) -> &str {
		self.hierarchy.actor_device_id()
	}

	pub const fn settings(&self) -> ScopeCacheSettings {
		self.settings
	}

	pub async fn get_service_identity(&self, id: &str) -> Option<ServiceIdentity> {
		self.hierarchy.get(id).await
	}

	pub async fn get_auth_chain(&self, id: &str) -> Option<AuthChain> {
		self.hierarchy.get_auth_chain(id).await
	}

	pub async fn get_all_ids(&self) -> Vec<String> {
		self.hierarchy.get_all_ids().await
	}

	pub async fn get_immediate_children(&self, id: &str) -> Vec<ServiceIdentity> {
		self.hierarchy.get_immediate_children(id).await
	}

	/// Register a new hook which can be used to react to identity churn.
	pub fn register_hook(&self, name: &'static str, tx: Sender<ScopeEvent>) -> HookId {
		HookId(
			self.hooks
				.write()
				.unwrap_or_else(PoisonError::into_inner)
				.push(Hook { name, tx }),
		)
	}

	pub fn unregister_hook(&self, id: HookId) {
		if let Some(hook) = self
			.hooks
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(id.0)
		{
			debug!(hook = hook.name, "Unregistered scope hook");
		}
	}

	/// Wakes the refresh loop up, unless a full refresh started less than
	/// [`ScopeCacheSettings::refresh_delay`] ago.
	pub fn initiate_cache_refresh(&self) {
		let last_full_refresh = *self
			.last_full_refresh
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		if last_full_refresh.is_some_and(|at| at.elapsed() < self.settings.refresh_delay) {
			debug!("Skipping requested scope cache refresh, the last one is too recent");
			return;
		}

		self.refresh_requested.notify_one();
	}

	/// Resolves once the refresh cycle running when this is called (or the next one, if idle)
	/// completes. It doesn't request a refresh by itself.
	pub fn wait_for_cache_refresh(
		&self,
		wait_timeout: Duration,
	) -> impl Future<Output = Result<()>> + Send + 'static {
		let mut completed_rx = self.refresh_completed.subscribe();

		async move {
			timeout(wait_timeout, completed_rx.changed())
				.await
				.map_err(|_| Error::RefreshTimeout(wait_timeout))?
				.map_err(|_| Error::Shutdown)
		}
	}

	/// Number of full refresh cycles finished so far, successful or not.
	pub fn refresh_cycles(&self) -> u64 {
		*self.refresh_completed.borrow()
	}

	/// Refreshes `id`, on behalf of the edge device relaying it when it is nested.
	pub async fn refresh_service_identity(&self, id: &str) -> Result<()> {
		let on_behalf_of = self.relay_of(id).await;
		self.refresh_identity(id, on_behalf_of.as_deref()).await
	}

	/// Refreshes every id, carrying on past failures. The first failure is returned.
	pub async fn refresh_service_identities(&self, ids: &[String]) -> Result<()> {
		let mut first_error = None;

		for id in ids {
			if let Err(e) = self.refresh_service_identity(id).await {
				warn!(%id, ?e, "Failed to refresh identity");
				first_error.get_or_insert(e);
			}
		}

		first_error.map_or(Ok(()), Err)
	}

	/// Refreshes every id of `auth_chain` but the actor device. Nested identities are queried on
	/// behalf of the edge device that relays them.
	pub async fn refresh_auth_chain(&self, auth_chain: &AuthChain) -> Result<()> {
		let actor_device_id = self.actor_device_id();
		let mut first_error = None;

		for id in auth_chain.ids().filter(|id| *id != actor_device_id) {
			let on_behalf_of = auth_chain
				.relay_of(id)
				.filter(|relay| *relay != actor_device_id);

			if let Err(e) = self.refresh_identity(id, on_behalf_of).await {
				warn!(%id, ?on_behalf_of, ?e, "Failed to refresh identity of auth chain");
				first_error.get_or_insert(e);
			}
		}

		first_error.map_or(Ok(()), Err)
	}

	/// Relay of a nested identity according to its cached chain. Identities hanging off the actor
	/// device are queried directly.
	async fn relay_of(&self, id: &str) -> Option<String> {
		let auth_chain = self.hierarchy.get_auth_chain(id).await?;

		auth_chain
			.relay_of(id)
			.filter(|relay| *relay != self.actor_device_id())
			.map(ToString::to_string)
	}

	async fn replay_persisted(&self) -> Result<()> {
		let records = self.store.load_all().await?;
		let mut replayed = 0;

		for record in records {
			match record.identity {
				Some(identity) => {
					self.hierarchy.insert_or_update(identity).await;
					replayed += 1;
				}
				None => {
					if let Err(e) = self.store.remove(&record.id).await {
						warn!(id = %record.id, ?e, "Failed to compact identity tombstone");
					}
				}
			}
		}

		info!(replayed, "Replayed persisted identities into the hierarchy");

		Ok(())
	}

	fn start_refresh_loop(self: &Arc<Self>) {
		let cache = Arc::downgrade(self);
		let refresh_requested = Arc::clone(&self.refresh_requested);
		let refresh_rate = self.settings.refresh_rate;

		spawn(async move {
			loop {
				let Some(cache) = cache.upgrade() else {
					debug!("Scope cache dropped, stopping refresh loop");
					break;
				};

				cache.refresh_cache().await;
				drop(cache);

				select! {
					() = sleep(refresh_rate) => {}
					() = refresh_requested.notified() => {
						debug!("Scope cache refresh requested");
					}
				}
			}
		});
	}

	#[instrument(skip(self))]
	async fn refresh_cache(&self) {
		*self
			.last_full_refresh
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

		debug!("Starting scope cache refresh");

		match self.refresh_all_identities().await {
			Ok(in_scope) => info!(in_scope, "Finished scope cache refresh"),
			Err(e) => error!(?e, "Failed to refresh scope cache, retrying on the next cycle;"),
		}

		self.refresh_completed.send_modify(|cycles| *cycles += 1);
	}

	async fn refresh_all_identities(&self) -> Result<usize> {
		let mut iterator = self.proxy.identities_iterator();
		let mut in_scope = HashSet::new();

		while iterator.has_next() {
			for identity in iterator.get_next().await? {
				let id = identity.id().to_string();
				if let Err(e) = self.handle_new_identity(identity).await {
					warn!(%id, ?e, "Failed to process identity in scope, skipping it");
				}
				in_scope.insert(id);
			}
		}

		for id in self.hierarchy.get_all_ids().await {
			if !in_scope.contains(&id) {
				if let Err(e) = self.handle_no_identity(&id).await {
					warn!(%id, ?e, "Failed to evict identity no longer in scope");
				}
			}
		}

		self.notify(&ScopeEvent::IdentitiesUpdated(
			self.hierarchy.get_all_ids().await,
		));

		Ok(in_scope.len())
	}

	async fn refresh_identity(&self, id: &str, on_behalf_of: Option<&str>) -> Result<()> {
		if !self.should_refresh(id).await {
			debug!(%id, "Identity refreshed recently, skipping");
			return Ok(());
		}

		self.last_refreshed.insert(id.to_string(), Instant::now());

		match self.proxy.get_service_identity(id, on_behalf_of).await {
			Ok(Some(identity)) => self.handle_new_identity(identity).await,
			Ok(None) => {
				debug!(%id, "Identity not in scope anymore");
				self.handle_no_identity(id).await
			}
			Err(Error::InvalidState { reason, .. }) => {
				debug!(%id, %reason, "Identity in invalid state");
				self.handle_no_identity(id).await
			}
			Err(e) => Err(e),
		}
	}

	async fn should_refresh(&self, id: &str) -> bool {
		// Identities without authentication are placeholders, always worth another look
		if self
			.hierarchy
			.get(id)
			.await
			.is_some_and(|identity| identity.authentication().auth_type() == AuthenticationType::None)
		{
			return true;
		}

		self.last_refreshed
			.get(id)
			.map_or(true, |at| at.elapsed() >= self.settings.refresh_delay)
	}

	async fn handle_new_identity(&self, identity: ServiceIdentity) -> Result<()> {
		if self.hierarchy.get(identity.id()).await.as_ref() == Some(&identity) {
			return Ok(());
		}

		debug!(id = %identity.id(), "Identity updated");

		self.hierarchy.insert_or_update(identity.clone()).await;
		self.store.save(&identity).await?;
		self.notify(&ScopeEvent::IdentityUpdated(identity));

		Ok(())
	}

	async fn handle_no_identity(&self, id: &str) -> Result<()> {
		self.last_refreshed.remove(id);

		let Some(previous) = self.hierarchy.get(id).await else {
			return Ok(());
		};

		info!(%id, "Evicting identity from scope");

		self.hierarchy.remove(id).await;
		self.store.tombstone(id).await?;

		if previous.is_enabled() {
			self.notify(&ScopeEvent::IdentityRemoved(id.to_string()));
		}

		Ok(())
	}

	fn notify(&self, event: &ScopeEvent) {
		self.hooks
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.for_each(|(_, hook)| hook.send(event.clone()));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{DeviceScopeApiClient, MemoryStore, ScopeResult};

	use eh_identity::{new_hierarchy, ServiceAuthentication, ServiceIdentityStatus};

	use std::sync::atomic::{AtomicUsize, Ordering};

	use async_trait::async_trait;

	struct CountingClient {
		identity: ServiceIdentity,
		lookups: AtomicUsize,
	}

	#[async_trait]
	impl DeviceScopeApiClient for CountingClient {
		async fn get_identities_in_scope(
			&self,
			_continuation_link: Option<String>,
		) -> Result<ScopeResult> {
			Ok(ScopeResult {
				identities: vec![self.identity.clone()],
				continuation_link: None,
			})
		}

		async fn get_identity(
			&self,
			id: &str,
			_on_behalf_of: Option<&str>,
		) -> Result<Option<ServiceIdentity>> {
			self.lookups.fetch_add(1, Ordering::SeqCst);
			Ok((id == self.identity.id()).then(|| self.identity.clone()))
		}
	}

	async fn cache_for(identity: ServiceIdentity) -> (Arc<ScopeCache>, Arc<CountingClient>) {
		let client = Arc::new(CountingClient {
			identity,
			lookups: AtomicUsize::new(0),
		});

		let cache = ScopeCache::new(
			new_hierarchy("edge1", true, 5),
			ServiceProxy::new(Arc::clone(&client) as Arc<dyn DeviceScopeApiClient>),
			Arc::new(MemoryStore::default()),
			ScopeCacheSettings {
				refresh_rate: ONE_HOUR,
				refresh_delay: ONE_HOUR,
			},
		)
		.await
		.unwrap();

		(cache, client)
	}

	#[tokio::test]
	async fn targeted_refreshes_are_debounced() {
		let (cache, client) = cache_for(ServiceIdentity::new_device(
			"d1",
			"gen",
			ServiceAuthentication::SymmetricKey {
				primary_key: "cHJpbWFyeQ==".to_string(),
				secondary_key: "c2Vjb25kYXJ5".to_string(),
			},
			ServiceIdentityStatus::Enabled,
		))
		.await;

		cache.refresh_service_identity("d1").await.unwrap();
		cache.refresh_service_identity("d1").await.unwrap();

		assert_eq!(client.lookups.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn identities_without_authentication_skip_the_debounce() {
		let (cache, client) = cache_for(ServiceIdentity::new_device(
			"d1",
			"gen",
			ServiceAuthentication::None,
			ServiceIdentityStatus::Enabled,
		))
		.await;

		cache.refresh_service_identity("d1").await.unwrap();
		cache.refresh_service_identity("d1").await.unwrap();
		cache.refresh_service_identity("d1").await.unwrap();

		assert_eq!(client.lookups.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn waiting_times_out_when_no_refresh_happens() {
		let (cache, _client) = cache_for(ServiceIdentity::new_device(
			"d1",
			"gen",
			ServiceAuthentication::None,
			ServiceIdentityStatus::Enabled,
		))
		.await;

		// Drain the startup cycle so nothing is in flight anymore
		let startup = cache.wait_for_cache_refresh(Duration::from_secs(5));
		if cache.refresh_cycles() == 0 {
			startup.await.unwrap();
		}

		assert!(matches!(
			cache
				.wait_for_cache_refresh(Duration::from_millis(50))
				.await,
			Err(Error::RefreshTimeout(_))
		));
	}
}
