use std::cell::Cell;

use chrono::{DateTime, Duration, Utc};
use openssl::{
    asn1::{Asn1Time, Asn1TimeRef},
    x509::{X509NameRef, X509},
};
use thiserror::Error;

use crate::source::{self, AcquireMode, AcquireOptions, SourceError};

/// Errors raised while loading or querying a certificate record.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(#[from] openssl::error::ErrorStack),
    #[error("Certificate data for {0} has not been loaded")]
    NotLoaded(String),
    #[error("Invalid validity timestamp")]
    InvalidTimestamp,
    #[error(transparent)]
    Source(#[from] SourceError),
}

type Result<T> = std::result::Result<T, CertificateError>;

/// The fields extracted from a parsed certificate. Immutable once set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub issuer: String,
    pub version: i32,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// SAN DNS names in the order the certificate presents them.
    pub san_hosts: Vec<String>,
}

/// One configured certificate location together with its parsed data and
/// warning threshold.
///
/// Data acquisition is deferred: a record is registered cheaply and loaded
/// on first access through [`CertificateRecord::ensure_loaded`].
#[derive(Debug)]
pub struct CertificateRecord {
    location: String,
    mode: AcquireMode,
    max_age: i64,
    message_template: String,
    options: AcquireOptions,
    pem: Option<String>,
    parsed: Option<ParsedCertificate>,
    // Snapshot of the remaining validity at first query, kept for the
    // lifetime of the record.
    expiry: Cell<Option<Duration>>,
}

impl CertificateRecord {
    pub fn new(
        location: &str,
        mode: AcquireMode,
        max_age: i64,
        message_template: &str,
        options: AcquireOptions,
    ) -> Self {
        Self {
            location: location.to_string(),
            mode,
            max_age,
            message_template: message_template.to_string(),
            options,
            pem: None,
            parsed: None,
            expiry: Cell::new(None),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn is_loaded(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn pem(&self) -> Option<&str> {
        self.pem.as_deref()
    }

    /// Acquires and parses the certificate data if that has not happened
    /// yet. Subsequent calls are no-ops.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.parsed.is_some() {
            return Ok(());
        }
        log::debug!("loading certificate data for {}", self.location);
        let pem = source::acquire(&self.location, self.mode, &self.options)?;
        self.load_from_pem(&pem)
    }

    /// Parses PEM text into the record's certificate fields.
    pub fn load_from_pem(&mut self, pem: &str) -> Result<()> {
        let cert = X509::from_pem(pem.as_bytes())?;

        let san_hosts = cert
            .subject_alt_names()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.dnsname().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        self.parsed = Some(ParsedCertificate {
            issuer: name_to_string(cert.issuer_name()),
            version: cert.version(),
            not_before: asn1_to_datetime(cert.not_before())?,
            not_after: asn1_to_datetime(cert.not_after())?,
            san_hosts,
        });
        self.pem = Some(pem.to_string());
        Ok(())
    }

    fn parsed(&self) -> Result<&ParsedCertificate> {
        self.parsed
            .as_ref()
            .ok_or_else(|| CertificateError::NotLoaded(self.location.clone()))
    }

    /// Time left until `not_after`, negative once the certificate has
    /// expired. Computed once and cached; later calls return the snapshot
    /// regardless of how much time has passed.
    pub fn until_expiry(&self, now: DateTime<Utc>) -> Result<Duration> {
        if let Some(expiry) = self.expiry.get() {
            return Ok(expiry);
        }
        let expiry = self.parsed()?.not_after - now;
        self.expiry.set(Some(expiry));
        Ok(expiry)
    }

    /// Day count of the expiry snapshot, floored toward negative infinity:
    /// a certificate expired by less than a day reports `-1`, not `0`, so
    /// the sign alone tells consumers it is already gone.
    pub fn valid_days(&self, now: DateTime<Utc>) -> Result<i64> {
        Ok(self.until_expiry(now)?.num_seconds().div_euclid(86400))
    }

    /// Whether `now` falls inside the certificate's validity window. Does
    /// not touch the expiry snapshot.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<bool> {
        let parsed = self.parsed()?;
        Ok(parsed.not_before < now && now < parsed.not_after)
    }

    /// Whether the admins should hear about this certificate: it is within
    /// the warning threshold, or already outside its validity window.
    pub fn should_warn(&self, now: DateTime<Utc>) -> Result<bool> {
        if !self.validate(now)? {
            return Ok(true);
        }
        Ok(self.valid_days(now)? <= self.max_age)
    }

    /// SAN DNS names, in certificate order.
    pub fn hosts(&self) -> Result<&[String]> {
        Ok(&self.parsed()?.san_hosts)
    }

    /// Renders the configured message template by literal placeholder
    /// substitution.
    pub fn message(&self, now: DateTime<Utc>) -> Result<String> {
        let expiry = self.until_expiry(now)?;
        let message = self
            .message_template
            .replace("{nline}", "\n")
            .replace("{cert.host}", &self.location)
            .replace("{cert.valid_days}", &self.valid_days(now)?.to_string())
            .replace("{cert.valid_seconds}", &expiry.num_seconds().to_string())
            .replace("{cert.valid}", &self.validate(now)?.to_string())
            .replace("{cert.max-age}", &self.max_age.to_string())
            .replace("{cert.alts}", &format_alts(self.hosts()?));
        Ok(message)
    }
}

/// Two records are equal only when both have loaded data and agree on SAN
/// hosts, validity bounds, version and issuer. Unloaded records compare
/// unequal even to themselves.
impl PartialEq for CertificateRecord {
    fn eq(&self, other: &Self) -> bool {
        match (&self.parsed, &other.parsed) {
            (Some(a), Some(b)) => {
                a.san_hosts == b.san_hosts
                    && a.not_after == b.not_after
                    && a.not_before == b.not_before
                    && a.version == b.version
                    && a.issuer == b.issuer
            }
            _ => false,
        }
    }
}

/// Human-readable alternative-name list: `a`, `a & b`, `a, b & c`.
fn format_alts(hosts: &[String]) -> String {
    match hosts {
        [] => String::new(),
        [single] => single.clone(),
        [head @ .., last] => format!("{} & {}", head.join(", "), last),
    }
}

/// Renders an X.509 name as `key=value` pairs joined by `, `.
fn name_to_string(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_default();
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Converts an ASN.1 time into a UTC timestamp by diffing against the Unix
/// epoch.
fn asn1_to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let seconds = diff.days as i64 * 86400 + diff.secs as i64;
    DateTime::<Utc>::from_timestamp(seconds, 0).ok_or(CertificateError::InvalidTimestamp)
}
