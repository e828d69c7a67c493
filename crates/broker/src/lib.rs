//! Connection broker of the edge hub.
//!
//! The [`ConnectionManager`] owns the device and cloud connection state of every client, while
//! the [`ScopeChangeListener`] disconnects clients whose identity changed under them.

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

mod device;
mod error;
mod hooks;
mod listener;
mod manager;
mod proxy;
mod subscription;

pub use error::{ConnectError, Error, Result};
pub use hooks::{ConnectionEvent, HookId};
pub use listener::ScopeChangeListener;
pub use manager::{ConnectionManager, DEFAULT_MAX_CONNECTED_CLIENTS};
pub use proxy::{
	CloseReason, CloudConnectionProvider, CloudConnectionStatus, CloudProxy, DeviceProxy,
	StatusSender,
};
pub use subscription::DeviceSubscription;
