use crate::SharedAccessSignature;

use eh_identity::{identity_id, ServiceAuthentication, ServiceIdentity};

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Identity a client claims when it connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
	device_id: String,
	module_id: Option<String>,
	id: String,
}

impl ClientIdentity {
	pub fn device(device_id: impl Into<String>) -> Self {
		let device_id = device_id.into();
		Self {
			id: device_id.clone(),
			device_id,
			module_id: None,
		}
	}

	pub fn module(device_id: impl Into<String>, module_id: impl Into<String>) -> Self {
		let device_id = device_id.into();
		let module_id = module_id.into();
		Self {
			id: identity_id(&device_id, Some(&module_id)),
			device_id,
			module_id: Some(module_id),
		}
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

	pub const fn is_module(&self) -> bool {
		self.module_id.is_some()
	}
}

impl fmt::Display for ClientIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.id)
	}
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
	/// Raw shared access signature.
	Token(String),
	/// Certificate presented during the TLS handshake, already chain-validated by the transport.
	X509 {
		thumbprint: String,
		common_name: String,
	},
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Token(_) => f.write_str("Token([REDACTED])"),
			Self::X509 {
				thumbprint,
				common_name,
			} => f
				.debug_struct("X509")
				.field("thumbprint", thumbprint)
				.field("common_name", common_name)
				.finish(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	identity: ClientIdentity,
	credential: Credential,
}

impl ClientCredentials {
	pub const fn new(identity: ClientIdentity, credential: Credential) -> Self {
		Self {
			identity,
			credential,
		}
	}

	pub const fn identity(&self) -> &ClientIdentity {
		&self.identity
	}

	pub const fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Whether the credential can be refreshed in place on a live cloud connection.
	pub const fn is_updatable(&self) -> bool {
		matches!(self.credential, Credential::Token(_))
	}

	/// Static checks that need neither the identity record nor any I/O.
	pub fn has_valid_shape(&self) -> bool {
		if self.identity.device_id.is_empty() || self.identity.module_id.as_deref() == Some("") {
			return false;
		}

		match &self.credential {
			Credential::Token(token) => SharedAccessSignature::parse(token).is_ok(),
			Credential::X509 { thumbprint, .. } => {
				matches!(thumbprint.len(), 40 | 64)
					&& thumbprint.bytes().all(|b| b.is_ascii_hexdigit())
			}
		}
	}

	/// Checks the credential against the authentication material of `identity`.
	pub fn matches(&self, identity: &ServiceIdentity, now: DateTime<Utc>) -> bool {
		match (identity.authentication(), &self.credential) {
			(
				ServiceAuthentication::SymmetricKey {
					primary_key,
					secondary_key,
				},
				Credential::Token(token),
			) => SharedAccessSignature::parse(token).is_ok_and(|sas| {
				!sas.is_expired(now)
					&& sas.is_for(identity.device_id(), identity.module_id())
					&& (sas.verify(primary_key) || sas.verify(secondary_key))
			}),

			(
				ServiceAuthentication::CertificateThumbprint {
					primary_thumbprint,
					secondary_thumbprint,
				},
				Credential::X509 { thumbprint, .. },
			) => {
				thumbprint.eq_ignore_ascii_case(primary_thumbprint)
					|| thumbprint.eq_ignore_ascii_case(secondary_thumbprint)
			}

			(ServiceAuthentication::CertificateAuthority, Credential::X509 { common_name, .. }) => {
				common_name == identity.device_id()
			}

			_ => false,
		}
	}
}

/// Last credentials each client authenticated with, used to refresh cloud connection tokens and
/// to re-authenticate clients when their identity changes.
#[async_trait]
pub trait CredentialsCache: Send + Sync + 'static {
	async fn add(&self, credentials: ClientCredentials);

	async fn get(&self, id: &str) -> Option<ClientCredentials>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialsCache {
	credentials: DashMap<String, ClientCredentials>,
}

impl MemoryCredentialsCache {
	pub fn new() -> Arc<Self> {
		Arc::default()
	}
}

#[async_trait]
impl CredentialsCache for MemoryCredentialsCache {
	async fn add(&self, credentials: ClientCredentials) {
		self.credentials
			.insert(credentials.identity().id().to_string(), credentials);
	}

	async fn get(&self, id: &str) -> Option<ClientCredentials> {
		self.credentials.get(id).map(|entry| entry.value().clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use eh_identity::ServiceIdentityStatus;

	use chrono::Duration;

	const THUMBPRINT: &str = "9F0BEB8FC3E1A4B0F29B2D4E1A0C5D3B7E6F8A91";

	fn x509(device_id: &str, thumbprint: &str, common_name: &str) -> ClientCredentials {
		ClientCredentials::new(
			ClientIdentity::device(device_id),
			Credential::X509 {
				thumbprint: thumbprint.to_string(),
				common_name: common_name.to_string(),
			},
		)
	}

	#[test]
	fn shapes_are_checked_statically() {
		assert!(x509("d1", THUMBPRINT, "d1").has_valid_shape());
		assert!(!x509("d1", "not-a-thumbprint", "d1").has_valid_shape());
		assert!(!x509("", THUMBPRINT, "d1").has_valid_shape());
		assert!(!ClientCredentials::new(
			ClientIdentity::device("d1"),
			Credential::Token("Bearer abc".to_string())
		)
		.has_valid_shape());
	}

	#[test]
	fn thumbprints_match_either_slot_ignoring_case() {
		let identity = ServiceIdentity::new_device(
			"d1",
			"gen",
			ServiceAuthentication::CertificateThumbprint {
				primary_thumbprint: "0".repeat(40),
				secondary_thumbprint: THUMBPRINT.to_ascii_lowercase(),
			},
			ServiceIdentityStatus::Enabled,
		);

		assert!(x509("d1", THUMBPRINT, "anything").matches(&identity, Utc::now()));
		assert!(!x509("d1", &"1".repeat(40), "anything").matches(&identity, Utc::now()));
	}

	#[test]
	fn certificate_authority_requires_the_device_common_name() {
		let identity = ServiceIdentity::new_device(
			"d1",
			"gen",
			ServiceAuthentication::CertificateAuthority,
			ServiceIdentityStatus::Enabled,
		);

		assert!(x509("d1", THUMBPRINT, "d1").matches(&identity, Utc::now()));
		assert!(!x509("d1", THUMBPRINT, "d2").matches(&identity, Utc::now()));
	}

	#[test]
	fn expired_tokens_do_not_match() {
		let key = "cHJpbWFyeS1rZXktZm9yLXRlc3Rz".to_string();
		let identity = ServiceIdentity::new_device(
			"d1",
			"gen",
			ServiceAuthentication::SymmetricKey {
				primary_key: key.clone(),
				secondary_key: key.clone(),
			},
			ServiceIdentityStatus::Enabled,
		);
		let expiry = DateTime::from_timestamp(Utc::now().timestamp() + 60, 0).unwrap();
		let credentials = ClientCredentials::new(
			ClientIdentity::device("d1"),
			Credential::Token(SharedAccessSignature::build("devices/d1", &key, expiry).unwrap()),
		);

		assert!(credentials.matches(&identity, Utc::now()));
		assert!(!credentials.matches(&identity, expiry + Duration::seconds(1)));
	}
}
