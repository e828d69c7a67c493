use crate::{Result, ScopeCache};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Body of an on-demand refresh request, `{"deviceIds": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
	pub device_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
	pub status: u16,
}

impl RefreshResponse {
	pub const OK: Self = Self { status: 200 };
	pub const BAD_REQUEST: Self = Self { status: 400 };
	pub const INTERNAL_ERROR: Self = Self { status: 500 };

	pub const fn is_success(self) -> bool {
		self.status == Self::OK.status
	}
}

/// Serves the "refresh these devices" method upstream invokes on the edge device when it changes
/// identities out of band.
pub struct RefreshRequestHandler {
	cache: Arc<ScopeCache>,
}

impl RefreshRequestHandler {
	pub const fn new(cache: Arc<ScopeCache>) -> Self {
		Self { cache }
	}

	pub async fn handle(&self, payload: &[u8]) -> RefreshResponse {
		let request = match parse_request(payload) {
			Ok(request) => request,
			Err(e) => {
				warn!(?e, "Received malformed scope refresh request");
				return RefreshResponse::BAD_REQUEST;
			}
		};

		debug!(device_ids = ?request.device_ids, "Refreshing devices on request");

		// Modules go along with their device, upstream only names devices
		let known_ids = self.cache.get_all_ids().await;
		let mut ids = Vec::with_capacity(request.device_ids.len());
		for device_id in request.device_ids {
			let module_prefix = format!("{device_id}/");
			ids.extend(
				known_ids
					.iter()
					.filter(|id| id.starts_with(&module_prefix))
					.cloned(),
			);
			ids.push(device_id);
		}

		match self.cache.refresh_service_identities(&ids).await {
			Ok(()) => RefreshResponse::OK,
			Err(e) => {
				warn!(?e, "Failed to refresh requested devices");
				RefreshResponse::INTERNAL_ERROR
			}
		}
	}
}

fn parse_request(payload: &[u8]) -> Result<RefreshRequest> {
	serde_json::from_slice(payload).map_err(Into::into)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn requests_use_camel_case() {
		assert_eq!(
			parse_request(br#"{"deviceIds":["d1","d2"]}"#).unwrap(),
			RefreshRequest {
				device_ids: vec!["d1".to_string(), "d2".to_string()]
			}
		);
		assert!(parse_request(br#"{"device_ids":["d1"]}"#).is_err());
		assert!(parse_request(b"d1,d2").is_err());
	}
}
