use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SAS_PREFIX: &str = "SharedAccessSignature ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
	#[error("token is not a shared access signature")]
	NotSharedAccessSignature,
	#[error("shared access signature is missing its '{0}' field")]
	MissingField(&'static str),
	#[error("shared access signature has a malformed '{0}' field")]
	MalformedField(&'static str),
	#[error("signing key is not valid base64")]
	InvalidKey,
}

/// Parsed `SharedAccessSignature sr=<audience>&sig=<signature>&se=<expiry>[&skn=<key name>]`.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedAccessSignature {
	/// Audience exactly as it was signed, still url encoded.
	signed_audience: String,
	audience: String,
	signature: Vec<u8>,
	expiry: DateTime<Utc>,
	key_name: Option<String>,
}

impl SharedAccessSignature {
	pub fn parse(token: &str) -> Result<Self, TokenError> {
		let fields = token
			.trim()
			.strip_prefix(SAS_PREFIX)
			.ok_or(TokenError::NotSharedAccessSignature)?;

		let (mut sr, mut sig, mut se, mut skn) = (None, None, None, None);
		for field in fields.split('&') {
			let (name, value) = field
				.split_once('=')
				.ok_or(TokenError::MalformedField("field"))?;
			match name {
				"sr" => sr = Some(value),
				"sig" => sig = Some(value),
				"se" => se = Some(value),
				"skn" => skn = Some(value),
				_ => {}
			}
		}

		let signed_audience = sr.ok_or(TokenError::MissingField("sr"))?;
		let audience = url_decode(signed_audience, "sr")?;

		let signature = STANDARD
			.decode(url_decode(sig.ok_or(TokenError::MissingField("sig"))?, "sig")?)
			.map_err(|_| TokenError::MalformedField("sig"))?;

		let expiry = se
			.ok_or(TokenError::MissingField("se"))?
			.parse::<i64>()
			.ok()
			.and_then(|secs| DateTime::from_timestamp(secs, 0))
			.ok_or(TokenError::MalformedField("se"))?;

		let key_name = skn.map(|skn| url_decode(skn, "skn")).transpose()?;

		Ok(Self {
			signed_audience: signed_audience.to_string(),
			audience,
			signature,
			expiry,
			key_name,
		})
	}

	/// Builds a token for `audience` signed with the base64 `key`.
	pub fn build(audience: &str, key: &str, expiry: DateTime<Utc>) -> Result<String, TokenError> {
		let signed_audience = utf8_percent_encode(audience, NON_ALPHANUMERIC).to_string();
		let mut mac = new_mac(key)?;
		mac.update(string_to_sign(&signed_audience, expiry).as_bytes());
		let signature = STANDARD.encode(mac.finalize().into_bytes());

		Ok(format!(
			"{SAS_PREFIX}sr={signed_audience}&sig={}&se={}",
			utf8_percent_encode(&signature, NON_ALPHANUMERIC),
			expiry.timestamp()
		))
	}

	pub fn audience(&self) -> &str {
		&self.audience
	}

	pub const fn expiry(&self) -> DateTime<Utc> {
		self.expiry
	}

	pub fn key_name(&self) -> Option<&str> {
		self.key_name.as_deref()
	}

	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expiry <= now
	}

	/// Whether the audience names the resource path of the given identity. The host part of the
	/// audience is not checked.
	pub fn is_for(&self, device_id: &str, module_id: Option<&str>) -> bool {
		let resource = module_id.map_or_else(
			|| format!("devices/{device_id}"),
			|module_id| format!("devices/{device_id}/modules/{module_id}"),
		);

		let audience = self.audience.trim_end_matches('/').to_ascii_lowercase();
		let resource = resource.to_ascii_lowercase();

		audience == resource || audience.ends_with(&format!("/{resource}"))
	}

	/// Constant time check of the signature against the base64 `key`.
	pub fn verify(&self, key: &str) -> bool {
		new_mac(key).is_ok_and(|mut mac| {
			mac.update(string_to_sign(&self.signed_audience, self.expiry).as_bytes());
			mac.verify_slice(&self.signature).is_ok()
		})
	}
}

impl fmt::Debug for SharedAccessSignature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SharedAccessSignature")
			.field("audience", &self.audience)
			.field("expiry", &self.expiry)
			.field("key_name", &self.key_name)
			.field("signature", &"[REDACTED]")
			.finish()
	}
}

fn new_mac(key: &str) -> Result<HmacSha256, TokenError> {
	let key = STANDARD.decode(key).map_err(|_| TokenError::InvalidKey)?;
	HmacSha256::new_from_slice(&key).map_err(|_| TokenError::InvalidKey)
}

fn string_to_sign(signed_audience: &str, expiry: DateTime<Utc>) -> String {
	format!("{signed_audience}\n{}", expiry.timestamp())
}

fn url_decode(value: &str, field: &'static str) -> Result<String, TokenError> {
	percent_decode_str(value)
		.decode_utf8()
		.map(|decoded| decoded.into_owned())
		.map_err(|_| TokenError::MalformedField(field))
}
