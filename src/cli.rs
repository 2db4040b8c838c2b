use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_VAPID_SUBJECT: &str = "mailto:admin@example.com";
const DEFAULT_VAPID_TTL: u32 = 259_200;

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(herald::config::AppConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::GenerateKeys(args)) = cli.command.as_ref() {
        let code = run_generate_keys(&cli, args);
        return RunOutcome::Exit(code);
    }

    match resolve_config(&cli) {
        Ok(config) => RunOutcome::Serve(config),
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "herald",
    version,
    about = "Web push notification dispatch and scheduling server"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "HERALD_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    #[arg(long, env = "HERALD_DATA", default_value = "herald.json")]
    data: PathBuf,
    #[arg(long, env = "HERALD_ADMIN_SECRET")]
    admin_secret: Option<String>,
    #[arg(long, env = "HERALD_VAPID_SUBJECT", default_value = DEFAULT_VAPID_SUBJECT)]
    vapid_subject: String,
    #[arg(long, env = "HERALD_VAPID_TTL", default_value_t = DEFAULT_VAPID_TTL)]
    vapid_ttl: u32,
    #[arg(long, env = "HERALD_PUSH_TIMEOUT", default_value = "10s")]
    push_timeout: String,
    #[arg(long, env = "HERALD_FANOUT_CONCURRENCY", default_value_t = 8)]
    fanout_concurrency: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the signing keypair in the data file. Deletes all subscriptions.
    GenerateKeys(GenerateKeysArgs),
}

#[derive(Args, Debug)]
struct GenerateKeysArgs {
    #[arg(long)]
    show_private_key: bool,
}

fn run_generate_keys(cli: &Cli, args: &GenerateKeysArgs) -> i32 {
    let store = match herald::adapters::JsonFileStore::open(&cli.data) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open data file {}: {err}", cli.data.display());
            return 1;
        }
    };
    let keys = match herald::push::rotate_keys(
        Arc::new(store),
        &cli.vapid_subject,
        time::OffsetDateTime::now_utc(),
    ) {
        Ok(keys) => keys,
        Err(err) => {
            eprintln!("failed to generate signing keys: {err}");
            return 1;
        }
    };

    println!("Signing keys generated. All previous subscriptions were removed.");
    println!();
    println!("public key: {}", keys.public_key);
    println!("subject:    {}", keys.subject);
    if args.show_private_key {
        println!();
        println!("{}", keys.private_key.trim_end());
    }
    0
}

fn resolve_config(cli: &Cli) -> Result<herald::config::AppConfig, String> {
    let admin_secret = cli
        .admin_secret
        .as_deref()
        .map(str::trim)
        .ok_or("--admin-secret (or HERALD_ADMIN_SECRET) is required")?;
    if admin_secret.is_empty() {
        return Err("admin secret cannot be empty".to_string());
    }

    let vapid_subject = cli.vapid_subject.trim();
    if !(vapid_subject.starts_with("mailto:") || vapid_subject.starts_with("https://")) {
        return Err(format!(
            "invalid vapid subject '{vapid_subject}'; expected a mailto: or https: URI"
        ));
    }

    if cli.fanout_concurrency == 0 {
        return Err("fanout concurrency must be greater than 0".to_string());
    }

    Ok(herald::config::AppConfig {
        bind: cli.bind,
        data_path: cli.data.clone(),
        admin_secret: admin_secret.to_string(),
        vapid_subject: vapid_subject.to_string(),
        vapid_ttl: cli.vapid_ttl,
        push_timeout: parse_duration(&cli.push_timeout)?,
        fanout_concurrency: cli.fanout_concurrency,
    })
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("push timeout cannot be empty".to_string());
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid push timeout '{value}'; expected <number>[s|m|h|d]"))?;

    if amount == 0 {
        return Err("push timeout must be greater than 0".to_string());
    }

    match unit {
        's' => Ok(Duration::from_secs(amount)),
        'm' => Ok(Duration::from_secs(amount * 60)),
        'h' => Ok(Duration::from_secs(amount * 60 * 60)),
        'd' => Ok(Duration::from_secs(amount * 60 * 60 * 24)),
        _ => Err(format!(
            "invalid push timeout '{value}'; expected <number>[s|m|h|d]"
        )),
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            command: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data: PathBuf::from("herald.json"),
            admin_secret: Some("secret".to_string()),
            vapid_subject: DEFAULT_VAPID_SUBJECT.to_string(),
            vapid_ttl: DEFAULT_VAPID_TTL,
            push_timeout: "10s".to_string(),
            fanout_concurrency: 8,
        }
    }

    #[test]
    fn parse_duration__should_parse_seconds_when_unit_missing() {
        // When
        let duration = parse_duration("30").expect("parse duration");

        // Then
        assert_eq!(duration, Duration::from_secs(30));
    }

    #[test]
    fn parse_duration__should_parse_units() {
        // When
        let duration = parse_duration("2m").expect("parse duration");

        // Then
        assert_eq!(duration, Duration::from_secs(120));
    }

    #[test]
    fn parse_duration__should_reject_invalid_values() {
        // Then
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5w").is_err());
    }

    #[test]
    fn resolve_config__should_require_admin_secret() {
        // Given
        let mut cli = base_cli();
        cli.admin_secret = None;

        // When
        let result = resolve_config(&cli);

        // Then
        assert!(result.is_err());
    }

    #[test]
    fn resolve_config__should_reject_subject_without_contact_scheme() {
        // Given
        let mut cli = base_cli();
        cli.vapid_subject = "admin@example.com".to_string();

        // Then
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn resolve_config__should_apply_defaults() {
        // When
        let config = resolve_config(&base_cli()).expect("resolve config");

        // Then
        assert_eq!(config.admin_secret, "secret");
        assert_eq!(config.vapid_ttl, DEFAULT_VAPID_TTL);
        assert_eq!(config.push_timeout, Duration::from_secs(10));
        assert_eq!(config.fanout_concurrency, 8);
        assert_eq!(config.vapid_subject, DEFAULT_VAPID_SUBJECT);
    }
}
