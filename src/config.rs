use std::{collections::HashMap, fs, io, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    certificate::CertificateRecord,
    mail::MailSettings,
    source::{self, AcquireMode, AcquireOptions},
};

/// Errors raised while loading or interpreting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no locations configured")]
    NoLocations,
    #[error("no locations specified for [{0}]")]
    EmptySection(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

const DEFAULT_MAX_AGE: i64 = 30;
const DEFAULT_TEMPLATE: &str =
    "Certificate for {cert.host} ({cert.alts}) expires in {cert.valid_days} days \
     (threshold: {cert.max-age} days)";

/// Per-location settings. Appears once at the top level of the file and
/// once per named section; section values override the top level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionConfig {
    #[serde(default)]
    pub mode: Option<AcquireMode>,
    /// Older spelling of `mode`, kept for existing config files.
    #[serde(default, rename = "poll-mode")]
    pub poll_mode: Option<AcquireMode>,
    #[serde(default, rename = "max-age")]
    pub max_age: Option<i64>,
    #[serde(default, rename = "message-template")]
    pub message_template: Option<String>,
    #[serde(default, rename = "cert-file")]
    pub cert_file: Option<String>,
    /// Host-mode connect/handshake timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
}

impl SectionConfig {
    /// Acquisition mode under either spelling, `mode` winning.
    pub fn mode(&self) -> Option<AcquireMode> {
        self.mode.or(self.poll_mode)
    }
}

/// The whole configuration file: top-level defaults, mail delivery
/// settings, and named `[section]` tables referenced from `locations`
/// entries of the form `section:<name>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Configuration {
    #[serde(flatten)]
    pub defaults: SectionConfig,
    #[serde(default, rename = "check-interval")]
    pub check_interval: Option<u64>,
    #[serde(default, rename = "mail-enable")]
    pub mail_enable: bool,
    #[serde(default, rename = "smtp-server")]
    pub smtp_server: Option<String>,
    #[serde(default, rename = "smtp-port")]
    pub smtp_port: Option<u16>,
    #[serde(default, rename = "smtp-user")]
    pub smtp_user: Option<String>,
    #[serde(default, rename = "smtp-password")]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(flatten)]
    pub sections: HashMap<String, SectionConfig>,
}

/// Effective settings for one location after section fallback.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: AcquireMode,
    pub max_age: i64,
    pub message_template: String,
    pub cert_file: Option<String>,
    pub timeout: Duration,
}

impl Settings {
    /// Builds an unloaded record for a location under these settings.
    pub fn record(&self, location: &str) -> CertificateRecord {
        CertificateRecord::new(
            location,
            self.mode,
            self.max_age,
            &self.message_template,
            AcquireOptions {
                cert_file: self.cert_file.clone(),
                timeout: self.timeout,
            },
        )
    }
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("reading configuration from {}", path.display());
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Resolves per-location settings, looking in the named section first
    /// and falling back to the top level.
    pub fn resolve(&self, section: Option<&str>) -> Settings {
        let overrides = section.and_then(|name| self.sections.get(name));

        Settings {
            mode: overrides
                .and_then(|s| s.mode())
                .or_else(|| self.defaults.mode())
                .unwrap_or(AcquireMode::Host),
            max_age: overrides
                .and_then(|s| s.max_age)
                .or(self.defaults.max_age)
                .unwrap_or(DEFAULT_MAX_AGE),
            message_template: overrides
                .and_then(|s| s.message_template.clone())
                .or_else(|| self.defaults.message_template.clone())
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            cert_file: overrides
                .and_then(|s| s.cert_file.clone())
                .or_else(|| self.defaults.cert_file.clone()),
            timeout: overrides
                .and_then(|s| s.timeout)
                .or(self.defaults.timeout)
                .map(Duration::from_secs)
                .unwrap_or(source::DEFAULT_TIMEOUT),
        }
    }

    /// Expands the configured location list into groups: plain entries
    /// stand alone, `section:<name>` entries pull in the section's own
    /// location list.
    ///
    /// Fails when no locations are configured at all, or when a referenced
    /// section is missing or has an empty list.
    pub fn location_groups(&self) -> Result<Vec<(Option<String>, Vec<String>)>> {
        let top = self
            .defaults
            .locations
            .as_ref()
            .filter(|locations| !locations.is_empty())
            .ok_or(ConfigError::NoLocations)?;

        let mut groups = Vec::new();
        for location in top {
            if let Some(name) = location.strip_prefix("section:") {
                let members = self
                    .sections
                    .get(name)
                    .and_then(|section| section.locations.clone())
                    .filter(|locations| !locations.is_empty())
                    .ok_or_else(|| ConfigError::EmptySection(name.to_string()))?;
                groups.push((Some(name.to_string()), members));
            } else {
                groups.push((None, vec![location.clone()]));
            }
        }
        Ok(groups)
    }

    /// Mail settings with addressing defaults filled in.
    pub fn mail_settings(&self) -> MailSettings {
        MailSettings {
            smtp_server: self.smtp_server.clone().unwrap_or_default(),
            smtp_port: self.smtp_port.unwrap_or(25),
            smtp_user: self.smtp_user.clone(),
            smtp_password: self.smtp_password.clone(),
            sender: self
                .sender
                .clone()
                .unwrap_or_else(|| "certnotify@localhost".to_string()),
            receiver: self
                .receiver
                .clone()
                .unwrap_or_else(|| "root@localhost".to_string()),
        }
    }

    /// Seconds between repeat runs in notify mode; `None` means run once.
    pub fn interval(&self) -> Option<Duration> {
        self.check_interval
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Configuration {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_top_level_settings() {
        let config = parse(
            r#"
            mode = "host"
            max-age = 14
            message-template = "{cert.host}: {cert.valid_days}"
            locations = ["a.example", "b.example:8443"]
            "#,
        );

        let settings = config.resolve(None);
        assert_eq!(settings.mode, AcquireMode::Host);
        assert_eq!(settings.max_age, 14);
        assert_eq!(settings.message_template, "{cert.host}: {cert.valid_days}");

        let groups = config.location_groups().unwrap();
        assert_eq!(
            groups,
            vec![
                (None, vec!["a.example".to_string()]),
                (None, vec!["b.example:8443".to_string()]),
            ]
        );
    }

    #[test]
    fn test_poll_mode_alias_and_defaults() {
        let config = parse(
            r#"
            poll-mode = "files"
            cert-file = "fullchain.pem"
            locations = ["/etc/letsencrypt/live/example"]
            "#,
        );

        let settings = config.resolve(None);
        assert_eq!(settings.mode, AcquireMode::Files);
        assert_eq!(settings.cert_file.as_deref(), Some("fullchain.pem"));
        assert_eq!(settings.max_age, DEFAULT_MAX_AGE);
        assert_eq!(settings.message_template, DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_section_overrides_fall_back_to_top_level() {
        let config = parse(
            r#"
            mode = "host"
            max-age = 30
            locations = ["section:internal"]

            [internal]
            max-age = 7
            locations = ["a.internal", "b.internal"]
            "#,
        );

        let settings = config.resolve(Some("internal"));
        assert_eq!(settings.max_age, 7);
        assert_eq!(settings.mode, AcquireMode::Host);

        let groups = config.location_groups().unwrap();
        assert_eq!(
            groups,
            vec![(
                Some("internal".to_string()),
                vec!["a.internal".to_string(), "b.internal".to_string()],
            )]
        );
    }

    #[test]
    fn test_no_locations() {
        let config = parse("max-age = 30");
        assert!(matches!(
            config.location_groups(),
            Err(ConfigError::NoLocations)
        ));

        let config = parse("locations = []");
        assert!(matches!(
            config.location_groups(),
            Err(ConfigError::NoLocations)
        ));
    }

    #[test]
    fn test_missing_or_empty_section() {
        let config = parse(r#"locations = ["section:ghost"]"#);
        assert!(matches!(
            config.location_groups(),
            Err(ConfigError::EmptySection(name)) if name == "ghost"
        ));

        let config = parse(
            r#"
            locations = ["section:empty"]

            [empty]
            max-age = 7
            "#,
        );
        assert!(matches!(
            config.location_groups(),
            Err(ConfigError::EmptySection(name)) if name == "empty"
        ));
    }

    #[test]
    fn test_mail_settings() {
        let config = parse(
            r#"
            locations = ["a.example"]
            mail-enable = true
            smtp-server = "mail.example.com"
            smtp-port = 587
            smtp-user = "notify"
            smtp-password = "hunter2"
            sender = "certnotify@example.com"
            receiver = "ops@example.com"
            "#,
        );

        assert!(config.mail_enable);
        let mail = config.mail_settings();
        assert_eq!(mail.smtp_server, "mail.example.com");
        assert_eq!(mail.smtp_port, 587);
        assert_eq!(mail.smtp_user.as_deref(), Some("notify"));
        assert_eq!(mail.sender, "certnotify@example.com");
        assert_eq!(mail.receiver, "ops@example.com");
    }

    #[test]
    fn test_timeout_key() {
        let config = parse(r#"locations = ["a.example"]"#);
        assert_eq!(config.resolve(None).timeout, source::DEFAULT_TIMEOUT);

        let config = parse(
            r#"
            timeout = 10
            locations = ["a.example", "section:slow"]

            [slow]
            timeout = 30
            locations = ["b.example"]
            "#,
        );
        assert_eq!(config.resolve(None).timeout, Duration::from_secs(10));
        assert_eq!(
            config.resolve(Some("slow")).timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_check_interval() {
        assert_eq!(parse(r#"locations = ["a"]"#).interval(), None);
        assert_eq!(
            parse("locations = [\"a\"]\ncheck-interval = 0").interval(),
            None
        );
        assert_eq!(
            parse("locations = [\"a\"]\ncheck-interval = 300").interval(),
            Some(Duration::from_secs(300))
        );
    }
}
