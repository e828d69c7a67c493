use eh_auth::ClientIdentity;

use flume::{Sender, TrySendError};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
	CloudConnectionEstablished(String),
	CloudConnectionLost(String),
	DeviceConnected(ClientIdentity),
	DeviceDisconnected(ClientIdentity),
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct HookId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct Hook {
	/// A name used for debugging purposes.
	pub(crate) name: &'static str,
	pub(crate) tx: Sender<ConnectionEvent>,
}

impl Hook {
	pub(crate) fn send(&self, event: ConnectionEvent) {
		match self.tx.try_send(event) {
			Ok(()) | Err(TrySendError::Disconnected(_)) => {}
			Err(TrySendError::Full(event)) => {
				warn!(hook = self.name, ?event, "Connection hook channel is full, dropping event");
			}
		}
	}
}
