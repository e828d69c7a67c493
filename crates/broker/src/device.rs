use crate::{CloseReason, CloudProxy, ConnectError, DeviceProxy, DeviceSubscription};

use eh_auth::ClientIdentity;

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, PoisonError, RwLock},
};

use futures::future::{BoxFuture, Shared};

pub(crate) type CloudConnectFuture =
	Shared<BoxFuture<'static, Result<Arc<dyn CloudProxy>, ConnectError>>>;

pub(crate) struct DeviceConnection {
	pub(crate) proxy: Arc<dyn DeviceProxy>,
	subscriptions: HashMap<DeviceSubscription, bool>,
}

/// Connection record of one identity. Device and cloud sides are replaced independently.
pub(crate) struct ConnectedDevice {
	pub(crate) identity: ClientIdentity,
	device_connection: Mutex<Option<DeviceConnection>>,
	cloud_connection: RwLock<Option<Arc<dyn CloudProxy>>>,
	/// Serializes cloud connection creation and teardown, holds the in-flight creation if any.
	pub(crate) cloud_connecting: tokio::sync::Mutex<Option<CloudConnectFuture>>,
}

impl ConnectedDevice {
	pub(crate) fn new(identity: ClientIdentity) -> Self {
		Self {
			identity,
			device_connection: Mutex::new(None),
			cloud_connection: RwLock::new(None),
			cloud_connecting: tokio::sync::Mutex::new(None),
		}
	}

	/// Installs `proxy`, closing the active connection it supersedes first. Subscriptions start
	/// over. Returns whether an active connection was superseded.
	pub(crate) fn replace_device_proxy(&self, proxy: Arc<dyn DeviceProxy>) -> bool {
		let mut device_connection = self
			.device_connection
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		let superseded = device_connection
			.take()
			.filter(|connection| connection.proxy.is_active())
			.map(|connection| connection.proxy.close(CloseReason::Superseded))
			.is_some();

		*device_connection = Some(DeviceConnection {
			proxy,
			subscriptions: HashMap::new(),
		});

		superseded
	}

	pub(crate) fn take_device_proxy(&self) -> Option<Arc<dyn DeviceProxy>> {
		self.device_connection
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
			.map(|connection| connection.proxy)
	}

	pub(crate) fn active_device_proxy(&self) -> Option<Arc<dyn DeviceProxy>> {
		self.device_connection
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.filter(|connection| connection.proxy.is_active())
			.map(|connection| Arc::clone(&connection.proxy))
	}

	/// Sets a subscription on the active device connection, returning whether its state changed.
	/// `None` without an active device connection.
	pub(crate) fn set_subscription(
		&self,
		subscription: DeviceSubscription,
		active: bool,
	) -> Option<bool> {
		self.device_connection
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_mut()
			.filter(|connection| connection.proxy.is_active())
			.map(|connection| {
				connection
					.subscriptions
					.insert(subscription, active)
					.unwrap_or(false)
					!= active
			})
	}

	pub(crate) fn subscriptions(&self) -> Vec<(DeviceSubscription, bool)> {
		self.device_connection
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.map(|connection| {
				connection
					.subscriptions
					.iter()
					.map(|(subscription, active)| (*subscription, *active))
					.collect()
			})
			.unwrap_or_default()
	}

	pub(crate) fn active_cloud_proxy(&self) -> Option<Arc<dyn CloudProxy>> {
		self.cloud_connection
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.filter(|proxy| proxy.is_active())
			.map(Arc::clone)
	}

	pub(crate) fn set_cloud_proxy(&self, proxy: Arc<dyn CloudProxy>) {
		*self
			.cloud_connection
			.write()
			.unwrap_or_else(PoisonError::into_inner) = Some(proxy);
	}

	pub(crate) fn take_cloud_proxy(&self) -> Option<Arc<dyn CloudProxy>> {
		self.cloud_connection
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
	}

	pub(crate) fn has_connection(&self) -> bool {
		self.active_device_proxy().is_some() || self.active_cloud_proxy().is_some()
	}
}
