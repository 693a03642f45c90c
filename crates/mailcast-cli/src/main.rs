//! Mailcast - campaign runner entry point

use anyhow::Context;
use clap::Parser;
use mailcast_common::config::LoggingConfig;
use mailcast_common::{Config, DispatchMode};
use mailcast_core::dispatch::DeliverySetup;
use mailcast_core::{AuditRecord, Campaign, CampaignSummary};
use mailcast_storage::FileResourceProvider;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mailcast")]
#[command(about = "Rate-limited bulk message dispatcher")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./mailcast.toml, then /etc/mailcast/mailcast.toml)
    #[arg(long, env = "MAILCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Resource directory (overrides config)
    #[arg(long, env = "MAILCAST_RESOURCES")]
    resources: Option<PathBuf>,

    /// Dispatch mode: api, relay, direct or rotation
    #[arg(long, env = "MAILCAST_MODE")]
    mode: Option<DispatchMode>,

    /// Concurrent workers, 1 to 100
    #[arg(long, env = "MAILCAST_CONCURRENCY")]
    concurrency: Option<i64>,

    /// Minimum pool-wide pause after the rate window fills, in ms
    #[arg(long, env = "MAILCAST_COOLING_MS")]
    cooling_ms: Option<i64>,

    /// Messages admitted per minute
    #[arg(long, env = "MAILCAST_RATE_LIMIT")]
    rate_limit: Option<i64>,

    /// Simulate every send
    #[arg(long, default_value_t = false)]
    test_mode: bool,

    /// Redirect test messages to this address
    #[arg(long, env = "MAILCAST_TEST_ADDRESS")]
    test_address: Option<String>,

    /// Attach the files in the resource attachments directory
    #[arg(long, default_value_t = false)]
    attachments: bool,

    /// Seed for template, sender and endpoint selection
    #[arg(long, env = "MAILCAST_SEED")]
    seed: Option<u64>,

    /// Write the audit trail here as JSON lines
    #[arg(long, env = "MAILCAST_AUDIT_LOG")]
    audit_log: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.resources {
            config.resources.dir = dir.clone();
        }
        if let Some(mode) = self.mode {
            config.campaign.mode = mode;
        }
        if let Some(concurrency) = self.concurrency {
            config.campaign.concurrency = concurrency;
        }
        if let Some(cooling_ms) = self.cooling_ms {
            config.campaign.cooling_ms = cooling_ms;
        }
        if let Some(rate_limit) = self.rate_limit {
            config.campaign.rate_limit_per_minute = rate_limit;
        }
        if self.test_mode {
            config.campaign.test_mode = true;
        }
        if let Some(address) = &self.test_address {
            config.campaign.test_override_address = Some(address.clone());
        }
        if self.attachments {
            config.campaign.include_attachments = true;
        }
        if let Some(seed) = self.seed {
            config.campaign.seed = Some(seed);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (mut config, load_error) = match &cli.config {
        Some(path) => match Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))
        {
            Ok(config) => (config, None),
            Err(e) => {
                eprintln!("campaign aborted: {:#}", e);
                return ExitCode::FAILURE;
            }
        },
        None => match Config::load() {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };

    init_logging(&config.logging);
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    cli.apply(&mut config);

    info!("Starting Mailcast campaign...");
    match run(config, cli.audit_log.as_deref()).await {
        Ok(summary) => {
            println!("{}", summary);
            if summary.cancelled {
                println!(
                    "Campaign cancelled, {} recipients were not processed",
                    summary.unsubmitted
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Campaign aborted: {}", e);
            eprintln!("campaign aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, audit_log: Option<&Path>) -> anyhow::Result<CampaignSummary> {
    let provider = FileResourceProvider::from_config(&config);
    let campaign =
        Campaign::prepare(config.campaign.clone(), &provider, DeliverySetup::live(&config)).await?;
    print_effective_config(&config, campaign.recipient_count());

    let audit = campaign.audit();
    let progress = tokio::spawn(print_progress(audit.subscribe(), campaign.recipient_count()));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight messages");
                cancel.cancel();
            }
        })
    };

    let summary = campaign.run(cancel).await;
    interrupt.abort();

    if let Some(path) = audit_log {
        match audit.write_jsonl(path) {
            Ok(()) => info!(path = %path.display(), records = audit.len(), "Audit trail written"),
            Err(e) => error!(path = %path.display(), "Failed to write audit trail: {}", e),
        }
    }

    // Closing the trail ends the progress stream
    drop(audit);
    if let Err(e) = progress.await {
        warn!("Progress display failed: {}", e);
    }

    Ok(summary)
}

fn print_effective_config(config: &Config, recipients: usize) {
    let campaign = &config.campaign;
    println!("Mailcast campaign");
    println!("  resources      {}", config.resources.dir.display());
    println!("  recipients     {}", recipients);
    println!("  mode           {}", campaign.mode);
    println!("  concurrency    {}", campaign.concurrency_limit());
    println!("  cooling        {} ms", campaign.cooling().as_millis());
    println!("  rate limit     {}/min", campaign.rate_limit());
    println!(
        "  test mode      {}",
        match (campaign.test_mode, campaign.active_override()) {
            (true, Some(address)) => format!("on, redirected to {}", address),
            (true, None) => "on".to_string(),
            (false, _) => "off".to_string(),
        }
    );
    println!(
        "  attachments    {}",
        if campaign.include_attachments { "on" } else { "off" }
    );
}

fn progress_line(record: &AuditRecord, done: usize, total: usize) -> String {
    let width = total.to_string().len();
    let mut line = format!(
        "[{:>width$}/{}] {:<19} {}",
        done,
        total,
        record.status.as_str(),
        record.recipient_email,
        width = width
    );
    if record.is_redirected() {
        line.push_str(&format!(" (to {})", record.delivered_to));
    }
    if let Some(endpoint) = &record.endpoint_used {
        line.push_str(&format!(" via {}", endpoint));
    }
    if let Some(reason) = &record.error {
        line.push_str(&format!(": {}", reason));
    }
    line
}

async fn print_progress(mut records: broadcast::Receiver<AuditRecord>, total: usize) {
    let mut done = 0usize;
    loop {
        match records.recv().await {
            Ok(record) => {
                done += 1;
                println!("{}", progress_line(&record, done, total));
            }
            Err(RecvError::Lagged(skipped)) => {
                done += skipped as usize;
                warn!(skipped, "Progress display fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailcast=debug", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use mailcast_core::OutcomeStatus;
    use pretty_assertions::assert_eq;

    fn record(status: OutcomeStatus, delivered_to: &str, error: Option<&str>) -> AuditRecord {
        AuditRecord {
            sequence_index: 0,
            recipient_email: "a@x.com".to_string(),
            delivered_to: delivered_to.to_string(),
            from_address: None,
            template_name: None,
            subject: None,
            endpoint_used: Some("smtp.example.com:587".to_string()),
            status,
            error: error.map(str::to_string),
            message_id: None,
            envelope: None,
            timestamp: Default::default(),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "mailcast",
            "--mode",
            "rotation",
            "--concurrency",
            "250",
            "--rate-limit",
            "30",
            "--test-mode",
            "--test-address",
            "test@y.com",
            "--seed",
            "7",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.campaign.mode, DispatchMode::AddressRotation);
        assert_eq!(config.campaign.rate_limit_per_minute, 30);
        assert_eq!(config.campaign.seed, Some(7));
        assert_eq!(config.campaign.active_override(), Some("test@y.com"));

        let validated = config.campaign.validated();
        assert_eq!(validated.concurrency, 100);
    }

    #[test]
    fn test_bad_mode_rejected() {
        assert!(Cli::try_parse_from(["mailcast", "--mode", "pigeon"]).is_err());
    }

    #[test]
    fn test_progress_line() {
        let line = progress_line(
            &record(OutcomeStatus::SimulatedTestSend, "test@y.com", None),
            3,
            120,
        );
        assert_eq!(
            line,
            "[  3/120] simulated_test_send a@x.com (to test@y.com) via smtp.example.com:587"
        );

        let line = progress_line(
            &record(OutcomeStatus::Error, "a@x.com", Some("Delivery failed.")),
            1,
            1,
        );
        assert_eq!(
            line,
            "[1/1] error               a@x.com via smtp.example.com:587: Delivery failed."
        );
    }
}
