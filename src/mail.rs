use chrono::Utc;

use crate::{
    certificate::CertificateRecord,
    channel::{CertRegistry, NotificationChannel, PollReply, Result},
};

/// SMTP connection and addressing settings, straight from configuration.
#[derive(Debug, Clone, Default)]
pub struct MailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub sender: String,
    pub receiver: String,
}

/// A composed report ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailEnvelope {
    pub sender: String,
    pub receiver: String,
    pub subject: String,
    pub body: String,
}

/// Delivery seam for the mail channel. The actual SMTP wire protocol lives
/// behind this trait; the channel only composes the report.
pub trait MailTransport {
    fn deliver(&mut self, settings: &MailSettings, envelope: &MailEnvelope) -> Result<()>;
}

/// Fallback transport that writes the report to the log instead of a
/// mailbox.
#[derive(Debug, Default)]
pub struct ConsoleTransport;

impl MailTransport for ConsoleTransport {
    fn deliver(&mut self, _settings: &MailSettings, envelope: &MailEnvelope) -> Result<()> {
        log::info!("{}", envelope.subject);
        for line in envelope.body.lines() {
            log::info!("{line}");
        }
        Ok(())
    }
}

/// Push-style channel that mails one report covering every registered
/// certificate that warrants a warning.
pub struct MailChannel {
    settings: MailSettings,
    registry: CertRegistry,
    transport: Box<dyn MailTransport>,
}

impl MailChannel {
    pub fn new(settings: MailSettings, transport: Box<dyn MailTransport>) -> Self {
        Self {
            settings,
            registry: CertRegistry::new(),
            transport,
        }
    }

    /// Loads every registered record and renders the report body.
    ///
    /// A location that fails to load is reported in the body and skipped;
    /// it never aborts the rest of the batch and no data is made up for it.
    /// Returns `None` when there is nothing to report.
    fn compose(&mut self) -> Result<Option<MailEnvelope>> {
        let now = Utc::now();
        let mut warnings = Vec::new();
        let mut failures = Vec::new();

        for (_, record) in self.registry.iter_mut() {
            if let Err(e) = record.ensure_loaded() {
                log::error!("cannot load certificate for {}: {e}", record.location());
                failures.push(format!("{}: {e}", record.location()));
                continue;
            }
            if record.should_warn(now)? {
                warnings.push(record.message(now)?);
            }
        }

        if warnings.is_empty() && failures.is_empty() {
            return Ok(None);
        }

        let mut body = warnings.join("\n");
        if !failures.is_empty() {
            if !body.is_empty() {
                body.push_str("\n\n");
            }
            body.push_str("Locations that could not be checked:\n");
            body.push_str(&failures.join("\n"));
        }

        Ok(Some(MailEnvelope {
            sender: self.settings.sender.clone(),
            receiver: self.settings.receiver.clone(),
            subject: format!(
                "Certificate expiry report: {} of {} locations need attention",
                warnings.len() + failures.len(),
                self.registry.len()
            ),
            body,
        }))
    }
}

impl NotificationChannel for MailChannel {
    fn register_certificate(&mut self, record: CertificateRecord) -> String {
        self.registry.register(record)
    }

    fn get_certificate(&mut self, id: &str) -> Option<&mut CertificateRecord> {
        self.registry.get_mut(id)
    }

    /// Composes and delivers the report. The queries argument is unused by
    /// this channel kind.
    fn send(&mut self, _queries: &[String]) -> Result<Vec<PollReply>> {
        match self.compose()? {
            Some(envelope) => {
                self.transport.deliver(&self.settings, &envelope)?;
                log::info!("report delivered to {}", envelope.receiver);
            }
            None => log::info!("no certificates need a warning"),
        }
        Ok(Vec::new())
    }
}
