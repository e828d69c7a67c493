use crate::{hub_module_id, AuthChain, IdentityHierarchy, ServiceIdentity};

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Full reconstruction of the nested edge topology.
///
/// Devices attach under the edge device whose scope matches one of their parent scopes, modules
/// attach under their owning device. Identities whose parent is not known yet stay dangling until
/// it shows up.
#[derive(Debug)]
pub struct NestedHierarchy {
	actor_device_id: String,
	actor_hub_id: String,
	tree: Mutex<Tree>,
}

impl NestedHierarchy {
	pub fn new(actor_device_id: impl Into<String>, max_nesting_depth: usize) -> Self {
		let actor_device_id = actor_device_id.into();
		Self {
			actor_hub_id: hub_module_id(&actor_device_id),
			tree: Mutex::new(Tree {
				actor_device_id: actor_device_id.clone(),
				max_nesting_depth,
				nodes: HashMap::new(),
			}),
			actor_device_id,
		}
	}
}

#[async_trait]
impl IdentityHierarchy for NestedHierarchy {
	fn actor_device_id(&self) -> &str {
		&self.actor_device_id
	}

	async fn insert_or_update(&self, identity: ServiceIdentity) {
		let mut tree = self.tree.lock().await;
		if tree.nodes.contains_key(identity.id()) {
			tree.remove(identity.id());
		}
		tree.insert(identity);
	}

	async fn remove(&self, id: &str) {
		self.tree.lock().await.remove(id);
	}

	async fn get(&self, id: &str) -> Option<ServiceIdentity> {
		self.tree
			.lock()
			.await
			.nodes
			.get(id)
			.map(|node| node.identity.clone())
	}

	async fn get_all_ids(&self) -> Vec<String> {
		self.tree.lock().await.nodes.keys().cloned().collect()
	}

	async fn get_auth_chain(&self, id: &str) -> Option<AuthChain> {
		if id == self.actor_device_id {
			return Some(AuthChain::for_actor(&self.actor_device_id));
		}

		if id == self.actor_hub_id {
			return Some(AuthChain::for_actor(&self.actor_device_id).extend(id));
		}

		self.tree
			.lock()
			.await
			.nodes
			.get(id)
			.and_then(|node| node.auth_chain.clone())
	}

	async fn get_immediate_children(&self, id: &str) -> Vec<ServiceIdentity> {
		let tree = self.tree.lock().await;
		tree.nodes.get(id).map_or_else(Vec::new, |node| {
			node.children
				.iter()
				.filter_map(|child_id| tree.nodes.get(child_id))
				.map(|child| child.identity.clone())
				.collect()
		})
	}

	async fn contains(&self, id: &str) -> bool {
		self.tree.lock().await.nodes.contains_key(id)
	}
}

#[derive(Debug)]
struct Node {
	identity: ServiceIdentity,
	parent: Option<String>,
	children: Vec<String>,
	auth_chain: Option<AuthChain>,
	/// Edge hops from the actor device, leaves and modules share their parent's depth.
	depth: usize,
}

impl Node {
	const fn new(identity: ServiceIdentity) -> Self {
		Self {
			identity,
			parent: None,
			children: Vec::new(),
			auth_chain: None,
			depth: 0,
		}
	}
}

#[derive(Debug)]
struct Tree {
	actor_device_id: String,
	max_nesting_depth: usize,
	nodes: HashMap<String, Node>,
}

impl Tree {
	fn insert(&mut self, identity: ServiceIdentity) {
		let id = identity.id().to_string();
		let parent_id = self.find_parent(&identity);
		self.nodes.insert(id.clone(), Node::new(identity));

		if id == self.actor_device_id {
			self.refresh_chains(&id);
		} else if let Some(parent_id) = parent_id {
			self.attach(&parent_id, &id);
		} else {
			debug!(%id, "Parent not in scope yet, identity is dangling");
		}

		for orphan_id in self.find_orphans_of(&id) {
			debug!(%orphan_id, parent_id = %id, "Adopting dangling identity");
			self.attach(&id, &orphan_id);
		}
	}

	fn remove(&mut self, id: &str) {
		let Some(node) = self.nodes.remove(id) else {
			return;
		};

		if let Some(parent) = node
			.parent
			.as_ref()
			.and_then(|parent_id| self.nodes.get_mut(parent_id))
		{
			parent.children.retain(|child_id| child_id != id);
		}

		for child_id in &node.children {
			if let Some(child) = self.nodes.get_mut(child_id) {
				child.parent = None;
			}
			self.refresh_chains(child_id);
		}
	}

	fn find_parent(&self, identity: &ServiceIdentity) -> Option<String> {
		if identity.id() == self.actor_device_id {
			return None;
		}

		if identity.is_module() {
			return self
				.nodes
				.contains_key(identity.device_id())
				.then(|| identity.device_id().to_string());
		}

		identity.parent_scopes().iter().find_map(|scope| {
			self.nodes
				.values()
				.find(|node| {
					node.identity.id() != identity.id()
						&& node.identity.is_edge_device()
						&& node.identity.device_scope() == Some(scope.as_str())
				})
				.map(|node| node.identity.id().to_string())
		})
	}

	fn find_orphans_of(&self, id: &str) -> Vec<String> {
		let Some(parent) = self.nodes.get(id).map(|node| &node.identity) else {
			return Vec::new();
		};

		if parent.is_module() {
			return Vec::new();
		}

		self.nodes
			.iter()
			.filter(|(orphan_id, orphan)| {
				orphan.parent.is_none()
					&& orphan_id.as_str() != id
					&& orphan_id.as_str() != self.actor_device_id
					&& is_parent_of(parent, &orphan.identity)
			})
			.map(|(orphan_id, _)| orphan_id.clone())
			.filter(|orphan_id| !self.is_ancestor(orphan_id, id))
			.collect()
	}

	/// Whether `candidate` sits above `id`, adopting it would close a loop.
	fn is_ancestor(&self, candidate: &str, id: &str) -> bool {
		let mut current = self.nodes.get(id).and_then(|node| node.parent.as_deref());
		let mut hops = 0;

		while let Some(ancestor) = current {
			if ancestor == candidate || hops > self.nodes.len() {
				return true;
			}
			hops += 1;
			current = self
				.nodes
				.get(ancestor)
				.and_then(|node| node.parent.as_deref());
		}

		false
	}

	fn attach(&mut self, parent_id: &str, child_id: &str) {
		if let Some(parent) = self.nodes.get_mut(parent_id) {
			if !parent.children.iter().any(|id| id == child_id) {
				parent.children.push(child_id.to_string());
			}
		}

		if let Some(child) = self.nodes.get_mut(child_id) {
			child.parent = Some(parent_id.to_string());
		}

		self.refresh_chains(child_id);
	}

	/// Recomputes chain and depth of `start` and its whole subtree from the current linkage.
	fn refresh_chains(&mut self, start: &str) {
		let mut queue = VecDeque::from([start.to_string()]);
		let mut visited = HashSet::new();

		while let Some(id) = queue.pop_front() {
			if !visited.insert(id.clone()) {
				continue;
			}

			let (auth_chain, depth) = self.derive_chain(&id);
			let Some(node) = self.nodes.get_mut(&id) else {
				continue;
			};

			node.auth_chain = auth_chain;
			node.depth = depth;
			queue.extend(node.children.iter().cloned());
		}
	}

	fn derive_chain(&self, id: &str) -> (Option<AuthChain>, usize) {
		if id == self.actor_device_id {
			return (Some(AuthChain::for_actor(id)), 1);
		}

		let Some(node) = self.nodes.get(id) else {
			return (None, 0);
		};

		let Some((parent_chain, parent_depth)) = node
			.parent
			.as_ref()
			.and_then(|parent_id| self.nodes.get(parent_id))
			.and_then(|parent| parent.auth_chain.as_ref().map(|chain| (chain, parent.depth)))
		else {
			return (None, 0);
		};

		let depth = if node.identity.is_edge_device() {
			parent_depth + 1
		} else {
			parent_depth
		};

		if depth > self.max_nesting_depth {
			warn!(
				%id,
				depth,
				max_nesting_depth = self.max_nesting_depth,
				"Identity nested too deep, discarding its auth chain"
			);
			return (None, depth);
		}

		(Some(parent_chain.extend(id)), depth)
	}
}

fn is_parent_of(parent: &ServiceIdentity, child: &ServiceIdentity) -> bool {
	if child.is_module() {
		return child.device_id() == parent.device_id();
	}

	parent.is_edge_device()
		&& parent
			.device_scope()
			.is_some_and(|scope| child.parent_scopes().iter().any(|parent_scope| parent_scope == scope))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		ServiceAuthentication, ServiceIdentityStatus, DEFAULT_MAX_NESTING_DEPTH, EDGE_CAPABILITY,
	};

	use tracing_test::traced_test;

	fn leaf(id: &str, parent_scope: &str) -> ServiceIdentity {
		ServiceIdentity::new_device(
			id,
			"gen",
			ServiceAuthentication::None,
			ServiceIdentityStatus::Enabled,
		)
		.with_parent_scopes([parent_scope])
	}

	fn edge(id: &str, parent_scope: Option<&str>) -> ServiceIdentity {
		let identity = ServiceIdentity::new_device(
			id,
			"gen",
			ServiceAuthentication::None,
			ServiceIdentityStatus::Enabled,
		)
		.with_capability(EDGE_CAPABILITY)
		.with_device_scope(scope_of(id));

		match parent_scope {
			Some(parent_scope) => identity.with_parent_scopes([parent_scope]),
			None => identity,
		}
	}

	fn module(device_id: &str, module_id: &str) -> ServiceIdentity {
		ServiceIdentity::new_module(
			device_id,
			module_id,
			"gen",
			ServiceAuthentication::None,
			ServiceIdentityStatus::Enabled,
		)
	}

	fn scope_of(id: &str) -> String {
		format!("scope-{id}")
	}

	async fn chain(hierarchy: &NestedHierarchy, id: &str) -> Option<String> {
		hierarchy
			.get_auth_chain(id)
			.await
			.map(|chain| chain.to_string())
	}

	#[tokio::test]
	async fn actor_and_hub_resolve_on_an_empty_tree() {
		let hierarchy = NestedHierarchy::new("edge1", DEFAULT_MAX_NESTING_DEPTH);

		assert_eq!(chain(&hierarchy, "edge1").await.as_deref(), Some("edge1"));
		assert_eq!(
			chain(&hierarchy, "edge1/$edgeHub").await.as_deref(),
			Some("edge1/$edgeHub;edge1")
		);
		assert_eq!(chain(&hierarchy, "leaf1").await, None);
	}

	#[tokio::test]
	async fn builds_chains_through_nested_edges() {
		let hierarchy = NestedHierarchy::new("edge1", DEFAULT_MAX_NESTING_DEPTH);
		hierarchy.insert_or_update(edge("edge1", None)).await;
		hierarchy
			.insert_or_update(edge("edge2", Some(&scope_of("edge1"))))
			.await;
		hierarchy.insert_or_update(module("edge2", "$edgeHub")).await;
		hierarchy
			.insert_or_update(leaf("leaf1", &scope_of("edge2")))
			.await;
		hierarchy.insert_or_update(module("leaf1", "sensor")).await;

		assert_eq!(
			chain(&hierarchy, "leaf1").await.as_deref(),
			Some("leaf1;edge2;edge1")
		);
		assert_eq!(
			chain(&hierarchy, "leaf1/sensor").await.as_deref(),
			Some("leaf1/sensor;leaf1;edge2;edge1")
		);
		assert_eq!(
			chain(&hierarchy, "edge2/$edgeHub").await.as_deref(),
			Some("edge2/$edgeHub;edge2;edge1")
		);

		let mut children = hierarchy
			.get_immediate_children("edge2")
			.await
			.into_iter()
			.map(|identity| identity.id().to_string())
			.collect::<Vec<_>>();
		children.sort();
		assert_eq!(children, ["edge2/$edgeHub", "leaf1"]);
	}

	#[tokio::test]
	async fn insertion_order_does_not_matter() {
		let hierarchy = NestedHierarchy::new("edge1", DEFAULT_MAX_NESTING_DEPTH);
		hierarchy.insert_or_update(module("leaf1", "sensor")).await;
		hierarchy
			.insert_or_update(leaf("leaf1", &scope_of("edge2")))
			.await;
		hierarchy
			.insert_or_update(edge("edge2", Some(&scope_of("edge1"))))
			.await;

		assert_eq!(chain(&hierarchy, "leaf1/sensor").await, None);

		hierarchy.insert_or_update(edge("edge1", None)).await;

		assert_eq!(
			chain(&hierarchy, "leaf1/sensor").await.as_deref(),
			Some("leaf1/sensor;leaf1;edge2;edge1")
		);
	}

	#[tokio::test]
	#[traced_test]
	async fn chains_beyond_max_depth_are_discarded() {
		let hierarchy = NestedHierarchy::new("e1", DEFAULT_MAX_NESTING_DEPTH);
		hierarchy.insert_or_update(edge("e1", None)).await;
		for layer in 2..=7 {
			hierarchy
				.insert_or_update(edge(&format!("e{layer}"), Some(&scope_of(&format!("e{}", layer - 1)))))
				.await;
		}
		hierarchy.insert_or_update(leaf("leaf5", &scope_of("e5"))).await;
		hierarchy.insert_or_update(leaf("leaf6", &scope_of("e6"))).await;

		for layer in 1..=5 {
			let id = format!("e{layer}");
			let resolved = hierarchy.get_auth_chain(&id).await.unwrap();
			assert_eq!(resolved.len(), layer);
			assert_eq!(resolved.target(), id);
		}
		assert_eq!(chain(&hierarchy, "e6").await, None);
		assert_eq!(chain(&hierarchy, "e7").await, None);

		assert_eq!(
			chain(&hierarchy, "leaf5").await.as_deref(),
			Some("leaf5;e5;e4;e3;e2;e1")
		);
		assert_eq!(chain(&hierarchy, "leaf6").await, None);
		assert!(logs_contain("nested too deep"));
	}

	#[tokio::test]
	async fn max_depth_is_configurable() {
		let hierarchy = NestedHierarchy::new("e1", 2);
		hierarchy.insert_or_update(edge("e1", None)).await;
		hierarchy
			.insert_or_update(edge("e2", Some(&scope_of("e1"))))
			.await;
		hierarchy
			.insert_or_update(edge("e3", Some(&scope_of("e2"))))
			.await;

		assert!(hierarchy.get_auth_chain("e2").await.is_some());
		assert!(hierarchy.get_auth_chain("e3").await.is_none());
	}

	#[tokio::test]
	async fn removing_a_parent_detaches_its_children() {
		let hierarchy = NestedHierarchy::new("edge1", DEFAULT_MAX_NESTING_DEPTH);
		hierarchy.insert_or_update(edge("edge1", None)).await;
		hierarchy
			.insert_or_update(edge("edge2", Some(&scope_of("edge1"))))
			.await;
		hierarchy
			.insert_or_update(leaf("leaf1", &scope_of("edge2")))
			.await;
		hierarchy.insert_or_update(module("leaf1", "sensor")).await;

		hierarchy.remove("edge2").await;

		assert!(!hierarchy.contains("edge2").await);
		assert!(hierarchy.contains("leaf1").await);
		assert!(hierarchy.contains("leaf1/sensor").await);
		assert_eq!(chain(&hierarchy, "leaf1").await, None);
		assert_eq!(chain(&hierarchy, "leaf1/sensor").await, None);
		assert!(hierarchy.get_immediate_children("edge1").await.is_empty());

		hierarchy
			.insert_or_update(edge("edge2", Some(&scope_of("edge1"))))
			.await;

		assert_eq!(
			chain(&hierarchy, "leaf1/sensor").await.as_deref(),
			Some("leaf1/sensor;leaf1;edge2;edge1")
		);
	}

	#[tokio::test]
	async fn updates_reparent_identities() {
		let hierarchy = NestedHierarchy::new("edge1", DEFAULT_MAX_NESTING_DEPTH);
		hierarchy.insert_or_update(edge("edge1", None)).await;
		hierarchy
			.insert_or_update(edge("edge2", Some(&scope_of("edge1"))))
			.await;
		hierarchy
			.insert_or_update(edge("edge3", Some(&scope_of("edge1"))))
			.await;
		hierarchy
			.insert_or_update(leaf("leaf1", &scope_of("edge2")))
			.await;

		hierarchy
			.insert_or_update(leaf("leaf1", &scope_of("edge3")))
			.await;

		assert_eq!(
			chain(&hierarchy, "leaf1").await.as_deref(),
			Some("leaf1;edge3;edge1")
		);
		assert!(hierarchy.get_immediate_children("edge2").await.is_empty());
	}

	#[tokio::test]
	async fn stitched_loops_do_not_hang() {
		let hierarchy = NestedHierarchy::new("edge1", DEFAULT_MAX_NESTING_DEPTH);
		hierarchy
			.insert_or_update(edge("a", Some(&scope_of("b"))))
			.await;
		hierarchy
			.insert_or_update(edge("b", Some(&scope_of("a"))))
			.await;
		hierarchy
			.insert_or_update(edge("a", Some(&scope_of("b"))))
			.await;

		assert_eq!(chain(&hierarchy, "a").await, None);
		assert_eq!(chain(&hierarchy, "b").await, None);
	}

	#[tokio::test]
	async fn every_chain_starts_at_its_target_and_ends_at_the_actor() {
		let hierarchy = NestedHierarchy::new("edge1", DEFAULT_MAX_NESTING_DEPTH);
		hierarchy.insert_or_update(edge("edge1", None)).await;
		hierarchy.insert_or_update(module("edge1", "$edgeHub")).await;
		hierarchy
			.insert_or_update(edge("edge2", Some(&scope_of("edge1"))))
			.await;
		hierarchy
			.insert_or_update(edge("edge3", Some(&scope_of("edge2"))))
			.await;
		hierarchy
			.insert_or_update(leaf("leaf1", &scope_of("edge3")))
			.await;
		hierarchy
			.insert_or_update(leaf("dangling", "scope-unknown"))
			.await;

		for id in hierarchy.get_all_ids().await {
			if let Some(resolved) = hierarchy.get_auth_chain(&id).await {
				assert_eq!(resolved.target(), id);
				assert_eq!(resolved.root(), "edge1");
				assert!(resolved.len() <= 2 * DEFAULT_MAX_NESTING_DEPTH);
			}
		}
		assert_eq!(chain(&hierarchy, "dangling").await, None);
	}
}
