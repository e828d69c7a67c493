use crate::ConnectError;

use eh_auth::ClientCredentials;

use std::sync::Arc;

use async_trait::async_trait;
use flume::Sender;
use strum::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CloseReason {
	/// A newer connection of the same identity took over.
	Superseded,
	/// The identity lost its right to be connected.
	Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CloudConnectionStatus {
	ConnectionEstablished,
	Disconnected,
	TokenNearExpiry,
	TokenExpired,
}

/// Transport side handle of a connected client, driven synchronously by the protocol layer.
pub trait DeviceProxy: Send + Sync + 'static {
	fn is_active(&self) -> bool;

	/// Drains and closes the connection.
	fn close(&self, reason: CloseReason);
}

/// Upstream connection opened on behalf of one client.
#[async_trait]
pub trait CloudProxy: Send + Sync + 'static {
	fn is_active(&self) -> bool;

	async fn close(&self);

	async fn update_token(&self, credentials: &ClientCredentials) -> Result<(), ConnectError>;
}

#[async_trait]
pub trait CloudConnectionProvider: Send + Sync + 'static {
	/// Opens a cloud connection. The connection reports its status changes through `status`.
	async fn connect(
		&self,
		credentials: &ClientCredentials,
		status: StatusSender,
	) -> Result<Arc<dyn CloudProxy>, ConnectError>;
}

/// Status callback of one cloud connection, keyed by the identity it belongs to.
#[derive(Debug, Clone)]
pub struct StatusSender {
	id: String,
	tx: Sender<(String, CloudConnectionStatus)>,
}

impl StatusSender {
	pub(crate) fn new(id: impl Into<String>, tx: Sender<(String, CloudConnectionStatus)>) -> Self {
		Self { id: id.into(), tx }
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn send(&self, status: CloudConnectionStatus) {
		if self.tx.send((self.id.clone(), status)).is_err() {
			debug!(id = %self.id, %status, "Connection manager is gone, dropping cloud status");
		}
	}
}
