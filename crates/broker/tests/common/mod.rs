#![allow(dead_code)]

use eh_auth::{ClientCredentials, ClientIdentity, Credential};
use eh_broker::{
	CloseReason, CloudConnectionProvider, CloudProxy, ConnectError, ConnectionEvent, DeviceProxy,
	StatusSender,
};

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use tokio::time::{sleep, timeout};

pub const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct FakeDeviceProxy {
	active: AtomicBool,
	closed_with: Mutex<Option<CloseReason>>,
}

impl FakeDeviceProxy {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			active: AtomicBool::new(true),
			closed_with: Mutex::new(None),
		})
	}

	pub fn closed_with(&self) -> Option<CloseReason> {
		*self.closed_with.lock().unwrap()
	}
}

impl DeviceProxy for FakeDeviceProxy {
	fn is_active(&self) -> bool {
		self.active.load(Ordering::SeqCst)
	}

	fn close(&self, reason: CloseReason) {
		self.active.store(false, Ordering::SeqCst);
		*self.closed_with.lock().unwrap() = Some(reason);
	}
}

#[derive(Debug, Default)]
pub struct FakeCloudProxy {
	closed: AtomicBool,
	pub token_updates: AtomicUsize,
}

impl FakeCloudProxy {
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl CloudProxy for FakeCloudProxy {
	fn is_active(&self) -> bool {
		!self.is_closed()
	}

	async fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}

	async fn update_token(&self, _credentials: &ClientCredentials) -> Result<(), ConnectError> {
		self.token_updates.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[derive(Default)]
pub struct FakeCloudProvider {
	pub connects: AtomicUsize,
	pub failing: AtomicBool,
	connect_delay: Duration,
	proxies: Mutex<HashMap<String, Arc<FakeCloudProxy>>>,
	status: Mutex<HashMap<String, StatusSender>>,
}

impl FakeCloudProvider {
	pub fn new(connect_delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			connect_delay,
			..Default::default()
		})
	}

	pub fn proxy(&self, id: &str) -> Arc<FakeCloudProxy> {
		Arc::clone(&self.proxies.lock().unwrap()[id])
	}

	pub fn status(&self, id: &str) -> StatusSender {
		self.status.lock().unwrap()[id].clone()
	}
}

#[async_trait]
impl CloudConnectionProvider for FakeCloudProvider {
	async fn connect(
		&self,
		credentials: &ClientCredentials,
		status: StatusSender,
	) -> Result<Arc<dyn CloudProxy>, ConnectError> {
		self.connects.fetch_add(1, Ordering::SeqCst);
		sleep(self.connect_delay).await;

		if self.failing.load(Ordering::SeqCst) {
			return Err(ConnectError::Failed("upstream unreachable".to_string()));
		}

		let id = credentials.identity().id().to_string();
		let proxy = Arc::new(FakeCloudProxy::default());
		self.proxies
			.lock()
			.unwrap()
			.insert(id.clone(), Arc::clone(&proxy));
		self.status.lock().unwrap().insert(id, status);

		Ok(proxy)
	}
}

pub fn token_credentials(device_id: &str) -> ClientCredentials {
	ClientCredentials::new(
		ClientIdentity::device(device_id),
		Credential::Token(format!(
			"SharedAccessSignature sr=devices%2F{device_id}&sig=YWJj&se=4102444800"
		)),
	)
}

pub fn x509_credentials(device_id: &str) -> ClientCredentials {
	ClientCredentials::new(
		ClientIdentity::device(device_id),
		Credential::X509 {
			thumbprint: "9F0BEB8FC3E1A4B0F29B2D4E1A0C5D3B7E6F8A91".to_string(),
			common_name: device_id.to_string(),
		},
	)
}

pub async fn next_event(events: &flume::Receiver<ConnectionEvent>) -> ConnectionEvent {
	timeout(WAIT, events.recv_async())
		.await
		.expect("timed out waiting for a connection event")
		.unwrap()
}
