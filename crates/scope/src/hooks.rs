use eh_identity::ServiceIdentity;

use flume::{Sender, TrySendError};
use tracing::warn;

/// Identity churn observed by the scope cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEvent {
	/// An identity was added or its record changed.
	IdentityUpdated(ServiceIdentity),
	/// A previously enabled identity was evicted from scope.
	IdentityRemoved(String),
	/// A full refresh finished, carrying every id now in scope.
	IdentitiesUpdated(Vec<String>),
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct HookId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct Hook {
	/// A name used for debugging purposes.
	pub(crate) name: &'static str,
	pub(crate) tx: Sender<ScopeEvent>,
}

impl Hook {
	pub(crate) fn send(&self, event: ScopeEvent) {
		match self.tx.try_send(event) {
			Ok(()) | Err(TrySendError::Disconnected(_)) => {}
			Err(TrySendError::Full(event)) => {
				warn!(hook = self.name, ?event, "Scope hook channel is full, dropping event");
			}
		}
	}
}
