//! Authentication of edge hub clients.
//!
//! Clients present [`ClientCredentials`], either a shared access signature or an X.509
//! certificate. The [`AuthChainValidator`] decides them against the identities in scope of the
//! actor device and defers the ones it doesn't know to an underlying [`Authenticator`].

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

mod authenticator;
mod credentials;
mod error;
mod sas;
mod validator;

pub use authenticator::Authenticator;
pub use credentials::{
	ClientCredentials, ClientIdentity, Credential, CredentialsCache, MemoryCredentialsCache,
};
pub use error::{Error, Result};
pub use sas::{SharedAccessSignature, TokenError};
pub use validator::{AuthChainValidator, AuthChainValidatorSettings};
