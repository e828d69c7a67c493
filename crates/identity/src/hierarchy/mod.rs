use crate::{AuthChain, ServiceIdentity};

use std::{fmt, sync::Arc};

use async_trait::async_trait;

mod flat;
mod nested;

pub use flat::FlatHierarchy;
pub use nested::NestedHierarchy;

/// Edge hops an auth chain may span before it is discarded.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 5;

/// In-memory topology of the identities in scope of the actor device.
///
/// Every operation is serialized under a single lock owned by the implementation, so callers may
/// interleave mutations and chain lookups freely.
#[async_trait]
pub trait IdentityHierarchy: fmt::Debug + Send + Sync + 'static {
	/// Id of the local edge device, the root of every chain.
	fn actor_device_id(&self) -> &str;

	/// Idempotent upsert. An existing id is removed and inserted again so re-parenting and chain
	/// recomputation always run the same way.
	async fn insert_or_update(&self, identity: ServiceIdentity);

	/// Deletes `id`. Its children are detached and lose their chains, they are not deleted.
	async fn remove(&self, id: &str);

	async fn get(&self, id: &str) -> Option<ServiceIdentity>;

	async fn get_all_ids(&self) -> Vec<String>;

	/// The chain of `id`, or `None` when `id` is unknown, dangling or nested too deep.
	async fn get_auth_chain(&self, id: &str) -> Option<AuthChain>;

	async fn get_immediate_children(&self, id: &str) -> Vec<ServiceIdentity>;

	async fn contains(&self, id: &str) -> bool;
}

/// Picks the hierarchy flavour: full tree reconstruction when nesting is enabled, otherwise a flat
/// list where every identity hangs directly off the actor device.
#[must_use]
pub fn new_hierarchy(
	actor_device_id: impl Into<String>,
	nested_edge_enabled: bool,
	max_nesting_depth: usize,
) -> Arc<dyn IdentityHierarchy> {
	if nested_edge_enabled {
		Arc::new(NestedHierarchy::new(actor_device_id, max_nesting_depth))
	} else {
		Arc::new(FlatHierarchy::new(actor_device_id))
	}
}
