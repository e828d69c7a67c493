use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("maximum number of connected clients reached <max={max}>")]
	TooManyClients { max: usize },
	#[error("client has no active device connection <id='{0}'>")]
	NoDeviceConnection(String),

	#[error(transparent)]
	Connect(#[from] ConnectError),
}

/// Cloud connection failures. Every caller joining one in-flight connection attempt gets a copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
	#[error("failed to open cloud connection: {0}")]
	Failed(String),
	#[error("failed to update the cloud connection token: {0}")]
	TokenUpdate(String),
	#[error("cloud connection task was aborted: {0}")]
	Aborted(String),
}
