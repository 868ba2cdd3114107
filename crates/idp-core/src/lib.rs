//! # idp-core
//!
//! Core capabilities, configuration, and error handling shared by the
//! identity provider crates.
//!
//! - [`clock`] - the injected time source
//! - [`config`] - process-level SAML environment settings
//! - [`error`] - the core error type

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SamlEnvironmentConfig;
pub use error::{Error, Result};
