use std::fs;

use chrono::Utc;
use openssl::{
    asn1::Asn1Time,
    hash::MessageDigest,
    pkey::PKey,
    rsa::Rsa,
    x509::{extension::SubjectAlternativeName, X509NameBuilder, X509},
};
use tempfile::tempdir;

use certnotify::{
    channel::{NotificationChannel, PollReply},
    config::Configuration,
    script::ScriptChannel,
};

const DAY: i64 = 86400;

/// Self-signed certificate expiring `not_after_offset` seconds from now.
fn make_pem(not_after_offset: i64, host: &str) -> String {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", host).unwrap();
    let name = name.build();

    let now = Utc::now().timestamp();
    let not_before = Asn1Time::from_unix(now - DAY).unwrap();
    let not_after = Asn1Time::from_unix(now + not_after_offset).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&not_before).unwrap();
    builder.set_not_after(&not_after).unwrap();

    let mut san = SubjectAlternativeName::new();
    san.dns(host);
    let extension = san.build(&builder.x509v3_context(None, None)).unwrap();
    builder.append_extension(extension).unwrap();

    builder.sign(&key, MessageDigest::sha256()).unwrap();
    String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
}

#[test]
fn file_mode_location_warns_at_five_days() {
    let dir = tempdir().unwrap();
    let cert_dir = dir.path().join("live");
    fs::create_dir(&cert_dir).unwrap();
    fs::write(
        cert_dir.join("cert.pem"),
        make_pem(5 * DAY + 1800, "www.example.com"),
    )
    .unwrap();

    let config_path = dir.path().join("certnotify.toml");
    fs::write(
        &config_path,
        format!(
            r#"
            mode = "files"
            cert-file = "cert.pem"
            max-age = 30
            message-template = "{{cert.host}} expires in {{cert.valid_days}} days"
            locations = ["{}"]
            "#,
            cert_dir.display()
        ),
    )
    .unwrap();

    let config = Configuration::load(&config_path).unwrap();
    let mut channel = ScriptChannel::new();
    for (section, locations) in config.location_groups().unwrap() {
        let settings = config.resolve(section.as_deref());
        for location in locations {
            channel.register_certificate(settings.record(&location));
        }
    }

    // Lazy load happens on the first query.
    let replies = channel
        .send(&[
            "cert.0.should_warn".to_string(),
            "cert.0.valid_days".to_string(),
            "cert.0.valid".to_string(),
        ])
        .unwrap();
    assert_eq!(
        replies,
        [
            PollReply::Flag(true),
            PollReply::Days(5),
            PollReply::Flag(true),
        ]
    );

    let now = Utc::now();
    let record = channel.get_certificate("0").unwrap();
    assert!(record.should_warn(now).unwrap());
    let message = record.message(now).unwrap();
    assert!(message.ends_with("expires in 5 days"));
}
