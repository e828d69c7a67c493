use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Capability advertised by devices that run an edge hub and may parent other identities.
pub const EDGE_CAPABILITY: &str = "iotEdge";

/// Module id of the hub running on every edge device.
pub const EDGE_HUB_MODULE_ID: &str = "$edgeHub";

const MODULE_SEPARATOR: char = '/';

/// Builds the identity id of a device (`device`) or of one of its modules (`device/module`).
#[must_use]
pub fn identity_id(device_id: &str, module_id: Option<&str>) -> String {
	module_id.map_or_else(
		|| device_id.to_string(),
		|module_id| format!("{device_id}{MODULE_SEPARATOR}{module_id}"),
	)
}

/// Device part of an identity id.
pub(crate) fn device_of(id: &str) -> &str {
	id.split_once(MODULE_SEPARATOR).map_or(id, |(device_id, _)| device_id)
}

/// The identity id of the hub module running on `device_id`.
#[must_use]
pub fn hub_module_id(device_id: &str) -> String {
	identity_id(device_id, Some(EDGE_HUB_MODULE_ID))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
pub enum ServiceIdentityStatus {
	Enabled,
	Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticationType {
	None,
	SymmetricKey,
	CertificateThumbprint,
	CertificateAuthority,
}

/// How an identity proves who it is. Key material is base64, thumbprints are hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServiceAuthentication {
	None,
	#[serde(rename_all = "camelCase")]
	SymmetricKey {
		primary_key: String,
		secondary_key: String,
	},
	#[serde(rename_all = "camelCase")]
	CertificateThumbprint {
		primary_thumbprint: String,
		secondary_thumbprint: String,
	},
	CertificateAuthority,
}

impl ServiceAuthentication {
	#[must_use]
	pub const fn auth_type(&self) -> AuthenticationType {
		match self {
			Self::None => AuthenticationType::None,
			Self::SymmetricKey { .. } => AuthenticationType::SymmetricKey,
			Self::CertificateThumbprint { .. } => AuthenticationType::CertificateThumbprint,
			Self::CertificateAuthority => AuthenticationType::CertificateAuthority,
		}
	}
}

/// Authoritative record of a device or module, as handed out by the upstream authority.
///
/// Values are immutable, an update replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
	id: String,
	device_id: String,
	module_id: Option<String>,
	generation_id: String,
	#[serde(default)]
	capabilities: BTreeSet<String>,
	authentication: ServiceAuthentication,
	status: ServiceIdentityStatus,
	#[serde(default)]
	parent_scopes: Vec<String>,
	#[serde(default)]
	device_scope: Option<String>,
}

impl ServiceIdentity {
	pub fn new_device(
		device_id: impl Into<String>,
		generation_id: impl Into<String>,
		authentication: ServiceAuthentication,
		status: ServiceIdentityStatus,
	) -> Self {
		let device_id = device_id.into();
		Self {
			id: device_id.clone(),
			device_id,
			module_id: None,
			generation_id: generation_id.into(),
			capabilities: BTreeSet::new(),
			authentication,
			status,
			parent_scopes: Vec::new(),
			device_scope: None,
		}
	}

	pub fn new_module(
		device_id: impl Into<String>,
		module_id: impl Into<String>,
		generation_id: impl Into<String>,
		authentication: ServiceAuthentication,
		status: ServiceIdentityStatus,
	) -> Self {
		let device_id = device_id.into();
		let module_id = module_id.into();
		Self {
			id: identity_id(&device_id, Some(&module_id)),
			device_id,
			module_id: Some(module_id),
			generation_id: generation_id.into(),
			capabilities: BTreeSet::new(),
			authentication,
			status,
			parent_scopes: Vec::new(),
			device_scope: None,
		}
	}

	#[must_use]
	pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
		self.capabilities.insert(capability.into());
		self
	}

	#[must_use]
	pub fn with_parent_scopes(
		mut self,
		parent_scopes: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		self.parent_scopes = parent_scopes.into_iter().map(Into::into).collect();
		self
	}

	#[must_use]
	pub fn with_device_scope(mut self, device_scope: impl Into<String>) -> Self {
		self.device_scope = Some(device_scope.into());
		self
	}

	#[must_use]
	pub fn with_status(mut self, status: ServiceIdentityStatus) -> Self {
		self.status = status;
		self
	}

	#[must_use]
	pub fn with_authentication(mut self, authentication: ServiceAuthentication) -> Self {
		self.authentication = authentication;
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn device_id(&self) -> &str {
		&self.device_id
	}

	pub fn module_id(&self) -> Option<&str> {
		self.module_id.as_deref()
	}

	pub fn generation_id(&self) -> &str {
		&self.generation_id
	}

	pub const fn capabilities(&self) -> &BTreeSet<String> {
		&self.capabilities
	}

	pub const fn authentication(&self) -> &ServiceAuthentication {
		&self.authentication
	}

	pub const fn status(&self) -> ServiceIdentityStatus {
		self.status
	}

	pub fn parent_scopes(&self) -> &[String] {
		&self.parent_scopes
	}

	pub fn device_scope(&self) -> Option<&str> {
		self.device_scope.as_deref()
	}

	pub const fn is_module(&self) -> bool {
		self.module_id.is_some()
	}

	pub fn is_enabled(&self) -> bool {
		self.status == ServiceIdentityStatus::Enabled
	}

	/// Devices with the edge capability can parent other devices through their scope.
	pub fn is_edge_device(&self) -> bool {
		!self.is_module() && self.capabilities.contains(EDGE_CAPABILITY)
	}
}
