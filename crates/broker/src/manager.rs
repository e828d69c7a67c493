use crate::{
	device::{CloudConnectFuture, ConnectedDevice},
	hooks::Hook,
	CloseReason, CloudConnectionProvider, CloudConnectionStatus, CloudProxy, ConnectError,
	ConnectionEvent, DeviceProxy, DeviceSubscription, Error, HookId, Result, StatusSender,
};

use eh_auth::{ClientCredentials, ClientIdentity, CredentialsCache};

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dashmap::DashMap;
use flume::Sender;
use futures::FutureExt;
use stable_vec::StableVec;
use tokio::spawn;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_MAX_CONNECTED_CLIENTS: usize = 101;

/// Device and cloud connection state of every client of the edge hub.
///
/// Each identity has at most one active device connection and at most one cloud connection
/// attempt in flight. Losing the uplink closes every cloud connection at once.
pub struct ConnectionManager {
	devices: DashMap<String, Arc<ConnectedDevice>>,
	admission: Mutex<()>,
	max_clients: usize,
	provider: Arc<dyn CloudConnectionProvider>,
	credentials: Arc<dyn CredentialsCache>,
	/// Cloud connection attempts are readers, an uplink loss is the writer.
	uplink: tokio::sync::RwLock<()>,
	status_tx: Sender<(String, CloudConnectionStatus)>,
	hooks: RwLock<StableVec<Hook>>,
}

impl ConnectionManager {
	pub fn new(
		provider: Arc<dyn CloudConnectionProvider>,
		credentials: Arc<dyn CredentialsCache>,
		max_clients: usize,
	) -> Arc<Self> {
		let (status_tx, status_rx) = flume::unbounded::<(String, CloudConnectionStatus)>();

		let manager = Arc::new(Self {
			devices: DashMap::new(),
			admission: Mutex::new(()),
			max_clients,
			provider,
			credentials,
			uplink: tokio::sync::RwLock::new(()),
			status_tx,
			hooks: RwLock::default(),
		});

		let weak_manager = Arc::downgrade(&manager);
		spawn(async move {
			while let Ok((id, status)) = status_rx.recv_async().await {
				let Some(manager) = weak_manager.upgrade() else {
					break;
				};

				manager.handle_cloud_status(&id, status).await;
			}

			debug!("Cloud status loop stopped");
		});

		manager
	}

	/// Register a new hook which can be used to react to connection state changes.
	pub fn register_hook(&self, name: &'static str, tx: Sender<ConnectionEvent>) -> HookId {
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
			debug!(hook = hook.name, "Unregistered connection hook");
		}
	}

	/// Installs the device connection of `identity`, superseding its previous one.
	pub fn add_device_connection(
		&self,
		identity: ClientIdentity,
		proxy: Arc<dyn DeviceProxy>,
	) -> Result<()> {
		let device = self.get_or_create_device(&identity)?;

		if device.replace_device_proxy(proxy) {
			info!(id = %identity, "Closed device connection superseded by a newer one");
		}

		self.notify(&ConnectionEvent::DeviceConnected(identity));

		Ok(())
	}

	/// Drops the device connection of `id` and, if asked to, its cloud connection too. The
	/// connection record itself is kept.
	pub async fn remove_device_connection(&self, id: &str, remove_cloud_connection: bool) {
		let Some(device) = self.device(id) else {
			return;
		};

		if let Some(proxy) = device.take_device_proxy() {
			if proxy.is_active() {
				proxy.close(CloseReason::Removed);
			}
			self.notify(&ConnectionEvent::DeviceDisconnected(device.identity.clone()));
		}

		if remove_cloud_connection {
			self.close_cloud_connection(&device).await;
		}
	}

	/// Removes `id` from the fleet, connection record included.
	pub async fn remove_device(&self, id: &str) {
		self.remove_device_connection(id, true).await;
		if self.devices.remove(id).is_some() {
			info!(%id, "Removed device from the fleet");
		}
	}

	pub fn get_device_connection(&self, id: &str) -> Option<Arc<dyn DeviceProxy>> {
		self.device(id)
			.and_then(|device| device.active_device_proxy())
	}

	pub fn get_cloud_connection(&self, id: &str) -> Option<Arc<dyn CloudProxy>> {
		self.device(id).and_then(|device| device.active_cloud_proxy())
	}

	/// Identities with an active device connection.
	pub fn get_connected_clients(&self) -> Vec<ClientIdentity> {
		self.devices
			.iter()
			.filter(|entry| entry.value().active_device_proxy().is_some())
			.map(|entry| entry.value().identity.clone())
			.collect()
	}

	/// Whether `id` has an active device or cloud connection.
	pub fn is_connected(&self, id: &str) -> bool {
		self.device(id).is_some_and(|device| device.has_connection())
	}

	/// Returns the active cloud connection of the client, opening it if needed.
	///
	/// Concurrent callers for the same identity share a single connection attempt.
	pub async fn get_or_create_cloud_connection(
		self: &Arc<Self>,
		credentials: &ClientCredentials,
	) -> Result<Arc<dyn CloudProxy>> {
		let device = self.get_or_create_device(credentials.identity())?;

		if let Some(proxy) = device.active_cloud_proxy() {
			return Ok(proxy);
		}

		let connecting = {
			let mut in_flight = device.cloud_connecting.lock().await;

			if let Some(proxy) = device.active_cloud_proxy() {
				return Ok(proxy);
			}

			match in_flight.as_ref() {
				Some(connecting) => connecting.clone(),
				None => {
					let connecting = self.start_cloud_connection(&device, credentials.clone());
					*in_flight = Some(connecting.clone());
					connecting
				}
			}
		};

		connecting.await.map_err(Into::into)
	}

	/// Our own uplink dropped: every cloud connection goes down together.
	#[instrument(skip(self))]
	pub async fn handle_upstream_connectivity_lost(&self) {
		let _uplink = self.uplink.write().await;

		let devices = self
			.devices
			.iter()
			.map(|entry| Arc::clone(entry.value()))
			.collect::<Vec<_>>();

		let mut closed = 0;
		for device in devices {
			if self.close_cloud_connection(&device).await {
				closed += 1;
			}
		}

		info!(closed, "Closed every cloud connection after losing the uplink");
	}

	/// Returns whether the subscription state of the active connection changed.
	pub fn add_subscription(&self, id: &str, subscription: DeviceSubscription) -> Result<bool> {
		self.set_subscription(id, subscription, true)
	}

	/// Returns whether the subscription state of the active connection changed.
	pub fn remove_subscription(&self, id: &str, subscription: DeviceSubscription) -> Result<bool> {
		self.set_subscription(id, subscription, false)
	}

	/// Returns the subscriptions that went from active to inactive.
	pub fn remove_subscriptions(
		&self,
		id: &str,
		subscriptions: &[DeviceSubscription],
	) -> Result<Vec<DeviceSubscription>> {
		let mut removed = Vec::new();
		for subscription in subscriptions {
			if self.set_subscription(id, *subscription, false)? {
				removed.push(*subscription);
			}
		}

		Ok(removed)
	}

	pub fn get_subscriptions(&self, id: &str) -> Vec<(DeviceSubscription, bool)> {
		self.device(id)
			.map(|device| device.subscriptions())
			.unwrap_or_default()
	}

	pub fn is_subscribed(&self, id: &str, subscription: DeviceSubscription) -> bool {
		self.get_subscriptions(id)
			.contains(&(subscription, true))
	}

	fn set_subscription(
		&self,
		id: &str,
		subscription: DeviceSubscription,
		active: bool,
	) -> Result<bool> {
		self.device(id)
			.and_then(|device| device.set_subscription(subscription, active))
			.ok_or_else(|| Error::NoDeviceConnection(id.to_string()))
	}

	fn device(&self, id: &str) -> Option<Arc<ConnectedDevice>> {
		self.devices.get(id).map(|entry| Arc::clone(entry.value()))
	}

	fn get_or_create_device(&self, identity: &ClientIdentity) -> Result<Arc<ConnectedDevice>> {
		if let Some(device) = self.device(identity.id()) {
			return Ok(device);
		}

		let _admission = self
			.admission
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		if let Some(device) = self.device(identity.id()) {
			return Ok(device);
		}

		if self.devices.len() >= self.max_clients {
			warn!(id = %identity, max = self.max_clients, "Refusing client, too many connected clients");
			return Err(Error::TooManyClients {
				max: self.max_clients,
			});
		}

		let device = Arc::new(ConnectedDevice::new(identity.clone()));
		self.devices
			.insert(identity.id().to_string(), Arc::clone(&device));

		Ok(device)
	}

	fn start_cloud_connection(
		self: &Arc<Self>,
		device: &Arc<ConnectedDevice>,
		credentials: ClientCredentials,
	) -> CloudConnectFuture {
		let manager = Arc::clone(self);
		let device = Arc::clone(device);

		let task = spawn(async move {
			let id = device.identity.id().to_string();

			let result = {
				let _uplink = manager.uplink.read().await;

				let result = manager
					.provider
					.connect(&credentials, StatusSender::new(&id, manager.status_tx.clone()))
					.await;

				if let Ok(proxy) = &result {
					device.set_cloud_proxy(Arc::clone(proxy));
				}

				result
			};

			device.cloud_connecting.lock().await.take();

			match &result {
				Ok(_) => info!(%id, "Opened cloud connection"),
				Err(e) => warn!(%id, ?e, "Failed to open cloud connection;"),
			}

			result
		});

		async move {
			task.await
				.unwrap_or_else(|e| Err(ConnectError::Aborted(e.to_string())))
		}
		.boxed()
		.shared()
	}

	#[instrument(skip(self))]
	async fn handle_cloud_status(&self, id: &str, status: CloudConnectionStatus) {
		let Some(device) = self.device(id) else {
			debug!("Cloud status for an unknown client");
			return;
		};

		match status {
			CloudConnectionStatus::ConnectionEstablished => {
				self.notify(&ConnectionEvent::CloudConnectionEstablished(id.to_string()));
			}

			CloudConnectionStatus::Disconnected | CloudConnectionStatus::TokenExpired => {
				self.close_cloud_connection(&device).await;
			}

			CloudConnectionStatus::TokenNearExpiry => {
				if !self.refresh_cloud_token(&device).await {
					self.close_cloud_connection(&device).await;
				}
			}
		}
	}

	async fn refresh_cloud_token(&self, device: &ConnectedDevice) -> bool {
		let _in_flight = device.cloud_connecting.lock().await;
		let id = device.identity.id();

		let Some(proxy) = device.active_cloud_proxy() else {
			return false;
		};

		let Some(credentials) = self
			.credentials
			.get(id)
			.await
			.filter(ClientCredentials::is_updatable)
		else {
			debug!(%id, "No refreshable credentials for the cloud connection");
			return false;
		};

		match proxy.update_token(&credentials).await {
			Ok(()) => {
				debug!(%id, "Refreshed cloud connection token");
				true
			}
			Err(e) => {
				warn!(%id, ?e, "Failed to refresh cloud connection token;");
				false
			}
		}
	}

	/// Returns whether there was a cloud connection to close.
	async fn close_cloud_connection(&self, device: &ConnectedDevice) -> bool {
		let _in_flight = device.cloud_connecting.lock().await;

		let Some(proxy) = device.take_cloud_proxy() else {
			return false;
		};

		proxy.close().await;
		info!(id = %device.identity, "Closed cloud connection");
		self.notify(&ConnectionEvent::CloudConnectionLost(
			device.identity.id().to_string(),
		));

		true
	}

	fn notify(&self, event: &ConnectionEvent) {
		self.hooks
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.for_each(|(_, hook)| hook.send(event.clone()));
	}
}
