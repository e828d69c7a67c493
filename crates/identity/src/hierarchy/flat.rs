use crate::{hub_module_id, AuthChain, IdentityHierarchy, ServiceIdentity};

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Hierarchy used when nested edge is disabled: every identity is a direct child of the actor.
#[derive(Debug)]
pub struct FlatHierarchy {
	actor_device_id: String,
	actor_hub_id: String,
	identities: Mutex<HashMap<String, ServiceIdentity>>,
}

impl FlatHierarchy {
	pub fn new(actor_device_id: impl Into<String>) -> Self {
		let actor_device_id = actor_device_id.into();
		Self {
			actor_hub_id: hub_module_id(&actor_device_id),
			actor_device_id,
			identities: Mutex::default(),
		}
	}
}

#[async_trait]
impl IdentityHierarchy for FlatHierarchy {
	fn actor_device_id(&self) -> &str {
		&self.actor_device_id
	}

	async fn insert_or_update(&self, identity: ServiceIdentity) {
		self.identities
			.lock()
			.await
			.insert(identity.id().to_string(), identity);
	}

	async fn remove(&self, id: &str) {
		self.identities.lock().await.remove(id);
	}

	async fn get(&self, id: &str) -> Option<ServiceIdentity> {
		self.identities.lock().await.get(id).cloned()
	}

	async fn get_all_ids(&self) -> Vec<String> {
		self.identities.lock().await.keys().cloned().collect()
	}

	async fn get_auth_chain(&self, id: &str) -> Option<AuthChain> {
		if id == self.actor_device_id {
			return Some(AuthChain::for_actor(&self.actor_device_id));
		}

		if id == self.actor_hub_id || self.identities.lock().await.contains_key(id) {
			return Some(AuthChain::for_actor(&self.actor_device_id).extend(id));
		}

		None
	}

	async fn get_immediate_children(&self, id: &str) -> Vec<ServiceIdentity> {
		if id != self.actor_device_id {
			return Vec::new();
		}

		self.identities
			.lock()
			.await
			.values()
			.filter(|identity| identity.id() != self.actor_device_id)
			.cloned()
			.collect()
	}

	async fn contains(&self, id: &str) -> bool {
		self.identities.lock().await.contains_key(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ServiceAuthentication, ServiceIdentityStatus};

	fn device(id: &str) -> ServiceIdentity {
		ServiceIdentity::new_device(
			id,
			"gen",
			ServiceAuthentication::None,
			ServiceIdentityStatus::Enabled,
		)
	}

	#[tokio::test]
	async fn every_identity_hangs_off_the_actor() {
		let hierarchy = FlatHierarchy::new("edge1");
		hierarchy.insert_or_update(device("edge1")).await;
		hierarchy.insert_or_update(device("leaf1")).await;
		hierarchy
			.insert_or_update(device("nested").with_parent_scopes(["some-other-scope"]))
			.await;

		assert_eq!(
			hierarchy.get_auth_chain("leaf1").await.unwrap().to_string(),
			"leaf1;edge1"
		);
		assert_eq!(
			hierarchy.get_auth_chain("nested").await.unwrap().to_string(),
			"nested;edge1"
		);
		assert_eq!(
			hierarchy.get_auth_chain("edge1").await.unwrap().to_string(),
			"edge1"
		);
		assert!(hierarchy.get_auth_chain("unknown").await.is_none());

		let mut children = hierarchy
			.get_immediate_children("edge1")
			.await
			.into_iter()
			.map(|identity| identity.id().to_string())
			.collect::<Vec<_>>();
		children.sort();
		assert_eq!(children, ["leaf1", "nested"]);
		assert!(hierarchy.get_immediate_children("leaf1").await.is_empty());
	}

	#[tokio::test]
	async fn actor_hub_resolves_before_anything_is_inserted() {
		let hierarchy = FlatHierarchy::new("edge1");

		assert_eq!(
			hierarchy
				.get_auth_chain("edge1/$edgeHub")
				.await
				.unwrap()
				.to_string(),
			"edge1/$edgeHub;edge1"
		);

		hierarchy.insert_or_update(device("leaf1")).await;
		hierarchy.remove("leaf1").await;
		assert!(!hierarchy.contains("leaf1").await);
	}
}
