//! # certnotify
//!
//! Inspects X.509 certificates from local files or live TLS endpoints,
//! computes the remaining validity window, and raises notifications when a
//! configured age threshold is crossed.
//!
//! The main pieces:
//!
//! - **source**: turns a configured location into raw PEM, either by
//!   reading a file or by fetching the certificate a TLS peer presents.
//!   Trust-chain and hostname verification are disabled on purpose; the
//!   tool inspects whatever certificate a host hands out, including
//!   self-signed ones.
//! - **certificate**: parses the PEM into a [`certificate::CertificateRecord`]
//!   and answers validity, expiry and message-template queries.
//! - **channel**: the [`channel::NotificationChannel`] contract and the
//!   insertion-ordered certificate registry shared by the channel kinds.
//! - **script**: a compact text poll protocol for external monitoring
//!   agents (`cert.<id>.valid_days` and friends).
//! - **mail**: composes an expiry report and hands it to a
//!   [`mail::MailTransport`]; the SMTP wire protocol itself stays behind
//!   that seam.
//! - **config**: the TOML configuration file, including `section:` location
//!   groups.
//!
//! ## Example
//!
//! ```no_run
//! use certnotify::{
//!     channel::NotificationChannel,
//!     script::ScriptChannel,
//!     source::{AcquireMode, AcquireOptions},
//!     certificate::CertificateRecord,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut channel = ScriptChannel::new();
//!     channel.register_certificate(CertificateRecord::new(
//!         "example.com",
//!         AcquireMode::Host,
//!         30,
//!         "",
//!         AcquireOptions::default(),
//!     ));
//!
//!     for reply in channel.send(&["cert.0.valid_days".to_string()])? {
//!         println!("{reply}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod certificate;
pub mod channel;
pub mod config;
pub mod mail;
pub mod ports;
pub mod script;
pub mod source;
