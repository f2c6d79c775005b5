use std::fmt;

use thiserror::Error;

use crate::certificate::{CertificateError, CertificateRecord};

/// Errors raised while dispatching through a notification channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("report delivery failed: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// The outcome of a single poll query.
///
/// `NotFound` is the sentinel for unknown shapes and unknown identifiers.
/// It is a legitimate value rather than an error, so one bad query never
/// aborts a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum PollReply {
    Text(String),
    Days(i64),
    Seconds(f64),
    Flag(bool),
    Threshold(i64),
    NotFound,
}

impl fmt::Display for PollReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollReply::Text(text) => write!(f, "{text}"),
            PollReply::Days(days) => write!(f, "{days}"),
            PollReply::Seconds(seconds) => write!(f, "{seconds}"),
            PollReply::Flag(flag) => write!(f, "{flag}"),
            PollReply::Threshold(days) => write!(f, "{days}"),
            PollReply::NotFound => write!(f, "none"),
        }
    }
}

/// Insertion-ordered store of registered certificates.
///
/// Identifiers are assigned decimal sequence numbers, so they never contain
/// a `.` and stay unambiguous inside poll queries. Entries are never removed
/// during a run.
#[derive(Debug, Default)]
pub struct CertRegistry {
    entries: Vec<(String, CertificateRecord)>,
}

impl CertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its assigned identifier.
    pub fn register(&mut self, record: CertificateRecord) -> String {
        let id = self.entries.len().to_string();
        self.entries.push((id.clone(), record));
        id
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CertificateRecord> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == id)
            .map(|(_, record)| record)
    }

    /// Registered identifiers, in insertion order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut CertificateRecord)> {
        self.entries
            .iter_mut()
            .map(|(key, record)| (key.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Common contract of the notification channels.
///
/// A channel owns the registry of certificates it reports on; `send` is the
/// single polymorphic entry point, whether the channel answers poll queries
/// or pushes a report somewhere.
pub trait NotificationChannel {
    /// Appends a record to the channel registry, preserving insertion
    /// order, and returns the assigned identifier.
    fn register_certificate(&mut self, record: CertificateRecord) -> String;

    fn get_certificate(&mut self, id: &str) -> Option<&mut CertificateRecord>;

    /// Dispatches the channel's action. Poll-style channels resolve each
    /// query to a [`PollReply`]; push-style channels ignore the queries and
    /// return an empty batch.
    fn send(&mut self, queries: &[String]) -> Result<Vec<PollReply>>;
}
