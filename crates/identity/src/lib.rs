//! Identity model and trust topology of an edge gateway.
//!
//! A [`ServiceIdentity`] is the authoritative record the upstream authority keeps for a device or
//! a module. An [`IdentityHierarchy`] arranges those records in the nested edge topology and derives
//! the [`AuthChain`] proving a path of trust from any identity up to the local actor device.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod auth_chain;
mod hierarchy;
mod identity;

pub use auth_chain::{AuthChain, InvalidAuthChain, AUTH_CHAIN_SEPARATOR};
pub use hierarchy::{
	new_hierarchy, FlatHierarchy, IdentityHierarchy, NestedHierarchy, DEFAULT_MAX_NESTING_DEPTH,
};
pub use identity::{
	hub_module_id, identity_id, AuthenticationType, ServiceAuthentication, ServiceIdentity,
	ServiceIdentityStatus, EDGE_CAPABILITY, EDGE_HUB_MODULE_ID,
};
