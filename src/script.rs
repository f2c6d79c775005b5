use chrono::Utc;

use crate::{
    certificate::CertificateRecord,
    channel::{CertRegistry, NotificationChannel, PollReply, Result},
};

/// The poll queries the script channel answers. `<id>` stands for a
/// registry identifier substituted by the caller.
pub const POLLS: [&str; 8] = [
    "certs",
    "cert.<id>.valid_days",
    "cert.<id>.valid_seconds",
    "cert.<id>.valid",
    "cert.<id>.max-age",
    "cert.<id>.should_warn",
    "cert.<id>.alts",
    "polls",
];

/// The whitelist as advertised to callers: everything except the `polls`
/// introspection entry itself, comma-joined.
pub fn advertised_polls() -> String {
    POLLS
        .iter()
        .filter(|poll| **poll != "polls")
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text poll protocol for external monitoring tools.
///
/// Each query in a batch resolves independently and in order; unknown
/// shapes and identifiers yield [`PollReply::NotFound`] instead of failing
/// the batch.
#[derive(Debug, Default)]
pub struct ScriptChannel {
    registry: CertRegistry,
}

impl ScriptChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&mut self, query: &str) -> PollReply {
        if query.contains('.') {
            return self.resolve_cert_query(query);
        }

        match query {
            "certs" => PollReply::Text(self.registry.ids().join(", ")),
            "polls" => PollReply::Text(advertised_polls()),
            _ => PollReply::NotFound,
        }
    }

    /// Resolves a `category.<id>.leaf` query against a registered record,
    /// loading its certificate data on first access.
    fn resolve_cert_query(&mut self, query: &str) -> PollReply {
        let parts: Vec<&str> = query.split('.').collect();
        let &[category, id, leaf] = parts.as_slice() else {
            return PollReply::NotFound;
        };
        if category != "cert" {
            return PollReply::NotFound;
        }

        let Some(record) = self.registry.get_mut(id) else {
            return PollReply::NotFound;
        };
        if let Err(e) = record.ensure_loaded() {
            log::error!("cannot load certificate for {}: {e}", record.location());
            return PollReply::NotFound;
        }

        metric(record, leaf).unwrap_or(PollReply::NotFound)
    }
}

/// Maps a leaf name to its metric on a loaded record. Keyed by name, not by
/// whitelist position.
fn metric(record: &CertificateRecord, leaf: &str) -> Option<PollReply> {
    let now = Utc::now();
    let reply = match leaf {
        "valid_days" => PollReply::Days(record.valid_days(now).ok()?),
        "valid_seconds" => {
            PollReply::Seconds(record.until_expiry(now).ok()?.num_milliseconds() as f64 / 1000.0)
        }
        "valid" => PollReply::Flag(record.validate(now).ok()?),
        "max-age" => PollReply::Threshold(record.max_age()),
        "should_warn" => PollReply::Flag(record.should_warn(now).ok()?),
        "alts" => PollReply::Text(record.hosts().ok()?.join(", ")),
        _ => return None,
    };
    Some(reply)
}

impl NotificationChannel for ScriptChannel {
    fn register_certificate(&mut self, record: CertificateRecord) -> String {
        self.registry.register(record)
    }

    fn get_certificate(&mut self, id: &str) -> Option<&mut CertificateRecord> {
        self.registry.get_mut(id)
    }

    fn send(&mut self, queries: &[String]) -> Result<Vec<PollReply>> {
        Ok(queries.iter().map(|query| self.resolve(query)).collect())
    }
}
