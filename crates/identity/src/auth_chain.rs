use crate::identity::device_of;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AUTH_CHAIN_SEPARATOR: char = ';';

#[derive(Debug, Error)]
#[error("invalid auth chain: <chain='{0}'>")]
pub struct InvalidAuthChain(pub String);

/// Ordered ids from a target identity (first) up to the actor device (last).
///
/// Chains are derived from parent linkage, they are never a source of truth by themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthChain(Vec<String>);

#[allow(clippy::len_without_is_empty)] // A chain always holds at least the actor device
impl AuthChain {
	/// The base case: the actor device proves itself.
	pub fn for_actor(actor_device_id: impl Into<String>) -> Self {
		Self(vec![actor_device_id.into()])
	}

	/// Prepends `child_id`, yielding the chain of a child of this chain's target.
	#[must_use]
	pub fn extend(&self, child_id: impl Into<String>) -> Self {
		let mut ids = Vec::with_capacity(self.0.len() + 1);
		ids.push(child_id.into());
		ids.extend(self.0.iter().cloned());
		Self(ids)
	}

	pub fn target(&self) -> &str {
		&self.0[0]
	}

	pub fn root(&self) -> &str {
		&self.0[self.0.len() - 1]
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// The edge hub directly connected to the actor that relays for the target, if the target is
	/// more than one hop away.
	pub fn relaying_hub(&self) -> Option<&str> {
		(self.0.len() > 2).then(|| self.0[self.0.len() - 2].as_str())
	}

	pub fn ids(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
		self.0.iter().map(String::as_str)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.0.iter().any(|chain_id| chain_id == id)
	}

	/// The edge device `id` is reached through: the first id after it that belongs to another
	/// device. `None` if `id` isn't part of the chain or nothing relays it.
	pub fn relay_of(&self, id: &str) -> Option<&str> {
		let device_id = device_of(id);

		self.ids()
			.skip_while(|chain_id| *chain_id != id)
			.skip(1)
			.find(|chain_id| device_of(chain_id) != device_id)
	}
}

impl fmt::Display for AuthChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut ids = self.0.iter();
		if let Some(first) = ids.next() {
			f.write_str(first)?;
		}
		for id in ids {
			write!(f, "{AUTH_CHAIN_SEPARATOR}{id}")?;
		}
		Ok(())
	}
}

impl FromStr for AuthChain {
	type Err = InvalidAuthChain;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let ids = s
			.split(AUTH_CHAIN_SEPARATOR)
			.map(str::trim)
			.map(ToString::to_string)
			.collect::<Vec<_>>();

		if ids.iter().any(String::is_empty) {
			return Err(InvalidAuthChain(s.to_string()));
		}

		Ok(Self(ids))
	}
}

impl TryFrom<String> for AuthChain {
	type Error = InvalidAuthChain;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<AuthChain> for String {
	fn from(chain: AuthChain) -> Self {
		chain.to_string()
	}
}
