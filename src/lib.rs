//! Obtain and renew TLS certificates for bare IP addresses.
//!
//! This crate keeps exactly one certificate/key pair current on disk for a
//! single subject IP, issued by a ZeroSSL-style certificate authority. The
//! full life cycle is driven by a single sequential loop: request →
//! place validation files → poll until issued → download → persist →
//! re-check on a fixed interval and renew before the certificate expires.
//! After each successful renewal a reverse-proxy container can optionally be
//! signalled to reload.
//!
//! # Usage
//!
//! ```no_run
//! use ipssl::{Authority, Config, Renewer};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ipssl::Error> {
//! let config = Config::from_env()?;
//! let authority = Authority::new(config.api_key.clone())?;
//!
//! let renewer = Renewer::new(config, authority)?;
//! renewer.run(&CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # IP certificates
//!
//! Unlike domain certificates, the subject here is an IP address used as the
//! certificate's Common Name. The authority proves control of the address by
//! fetching a proof file over plain HTTP from
//! `http://<ip>/.well-known/pki-validation/`, so the web root configured as
//! the validation directory must be served on port 80 of that address while a
//! request is in flight.
//!
//! # Keys never leave the process
//!
//! Private keys are generated locally and only their CSR is submitted. The
//! key for an outstanding request lives in an in-memory cache (and on disk
//! once persisted); the authority cannot hand back a key it never received.

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod cert;
mod client;
mod config;
mod docker;
mod error;
mod poll;
mod renew;
mod req;
mod store;

pub mod api;
pub mod validation;


pub use crate::{
    cert::{create_p256_key, CertificateBundle},
    client::{Authority, Issuance, DEFAULT_API_URL},
    config::Config,
    docker::Reloader,
    error::{Error, Result},
    poll::PollOutcome,
    renew::{ReloadOutcome, RenewOutcome, Renewer},
    store::CertStore,
};
