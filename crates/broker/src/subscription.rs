use strum::{Display, EnumString};

/// Kinds of cloud to device traffic a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum DeviceSubscription {
	Methods,
	DesiredPropertyUpdates,
	C2D,
	ModuleMessages,
	TwinResponses,
}
