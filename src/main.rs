use std::{path::PathBuf, thread};

use anyhow::Context;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};

use certnotify::{
    channel::NotificationChannel,
    config::Configuration,
    mail::{ConsoleTransport, MailChannel},
    script::{advertised_polls, ScriptChannel},
};

#[derive(Parser, Debug)]
#[command(
    name = "certnotify",
    about = "Checks for certificates and notifies about expirations."
)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "/etc/certnotify.toml")]
    config: PathBuf,

    /// Item to poll; repeatable, answered in order. Switches the run into
    /// poll-and-print mode.
    #[arg(short, long, value_name = "ITEM")]
    poll: Vec<String>,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Print the available poll items and exit.
    #[arg(short = 'P', long)]
    print_polls: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let colors = ColoredLevelConfig::new()
        .debug(Color::Magenta)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    if fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{:width$}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                message,
                width = 5
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .is_err()
    {
        eprintln!("failed to initialize logging");
    }
}

/// Builds records for every configured location and registers them with
/// the channel, strictly in configuration order.
fn register_locations(
    config: &Configuration,
    channel: &mut dyn NotificationChannel,
) -> anyhow::Result<()> {
    for (section, locations) in config.location_groups()? {
        let settings = config.resolve(section.as_deref());
        for location in locations {
            log::info!("processing location: {location}");
            channel.register_certificate(settings.record(&location));
        }
    }
    Ok(())
}

/// One acquire-register-notify cycle in notify mode.
fn notify_once(config: &Configuration) -> anyhow::Result<()> {
    let mut channel = MailChannel::new(config.mail_settings(), Box::new(ConsoleTransport));
    register_locations(config, &mut channel)?;
    if !config.mail_enable {
        log::debug!("mail-enable is off; the report goes to the log only");
    }
    channel.send(&[])?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    if args.print_polls {
        println!("{}", advertised_polls());
        return Ok(());
    }

    let config = Configuration::load(&args.config)
        .with_context(|| format!("cannot load configuration from {}", args.config.display()))?;

    if !args.poll.is_empty() {
        let mut channel = ScriptChannel::new();
        register_locations(&config, &mut channel)?;
        for reply in channel.send(&args.poll)? {
            println!("{reply}");
        }
        return Ok(());
    }

    loop {
        notify_once(&config)?;
        match config.interval() {
            Some(interval) => {
                log::debug!("sleeping for {}s", interval.as_secs());
                thread::sleep(interval);
            }
            None => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["certnotify"]);
        assert_eq!(args.config, PathBuf::from("/etc/certnotify.toml"));
        assert!(args.poll.is_empty());
        assert!(!args.verbose);
        assert!(!args.print_polls);
    }

    #[test]
    fn test_cli_repeatable_poll() {
        let args = Args::parse_from([
            "certnotify",
            "-p",
            "certs",
            "--poll",
            "cert.0.valid_days",
            "-v",
        ]);
        assert_eq!(args.poll, ["certs", "cert.0.valid_days"]);
        assert!(args.verbose);
    }
}
