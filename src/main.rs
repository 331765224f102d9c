use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use wipe_ledger::algorithms::PatternPolicy;
use wipe_ledger::config::AppConfig;
use wipe_ledger::crypto::{JsonCertificateIssuer, Sha256HashGenerator};
use wipe_ledger::io::FileDeviceAccess;
use wipe_ledger::ledger::{Ledger, LedgerReference, LocalLedger};
use wipe_ledger::pipeline::BatchStatus;
use wipe_ledger::store::SqliteOperationStore;
use wipe_ledger::*;

/// Scratch size used by `--provision` when the configuration names none
const DEFAULT_SCRATCH_SIZE: u64 = 1024 * 1024;

#[derive(Parser)]
#[command(name = "wipe-ledger")]
#[command(about = "Policy-driven secure overwrite with a tamper-evident audit trail")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also write JSON logs to the configured logs directory
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Wipe one target and attest the result
    Wipe {
        /// Target path (file or block device)
        target: PathBuf,

        /// Compliance method (clear, purge, destroy)
        #[arg(short, long, default_value = "clear")]
        method: WipeMethod,

        /// Device class (HDD, SSD, USB, NVMe, SDCard, Other); inferred when omitted
        #[arg(long)]
        class: Option<DeviceClass>,

        /// Device identifier; derived from the path when omitted
        #[arg(long)]
        device_id: Option<String>,

        /// Skip post-write verification
        #[arg(long)]
        no_verify: bool,

        /// Block size in bytes
        #[arg(long)]
        block_size: Option<usize>,

        /// Overall timeout, e.g. "30m" or "1h"
        #[arg(long)]
        timeout: Option<humantime::Duration>,

        /// Create the target as a scratch file if it does not exist
        #[arg(long)]
        provision: bool,
    },

    /// Wipe several targets in order
    Batch {
        /// JSON manifest: an array of {"target", "method"?, "class"?, "device_id"?}
        #[arg(required_unless_present = "glob", conflicts_with = "glob")]
        manifest: Option<PathBuf>,

        /// Select targets with a glob pattern instead of a manifest
        #[arg(long)]
        glob: Option<String>,

        /// Method for entries that do not name one
        #[arg(short, long, default_value = "clear")]
        method: WipeMethod,

        /// Stop at the first failed target
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Print the pass table
    Policy,

    /// Inspect the ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// Verify a certificate's signature and ledger evidence
    VerifyCert {
        /// Certificate JSON file
        file: PathBuf,
    },

    /// List stored operations
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Check the hash chain for tampering
    Verify,
    /// Show one ledger record
    Show { reference: String },
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    target: PathBuf,
    #[serde(default)]
    method: Option<WipeMethod>,
    #[serde(default)]
    class: Option<DeviceClass>,
    #[serde(default)]
    device_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command ran but something failed.
async fn run(cli: Cli) -> Result<bool> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let _log_guard = wipe_ledger::logging::init_logging(level, &config.logs_dir, cli.json_logs)?;

    match cli.command {
        Commands::Wipe {
            target,
            method,
            class,
            device_id,
            no_verify,
            block_size,
            timeout,
            provision,
        } => {
            let device = describe_target(&target, device_id, class)?;
            let mut directive = config.directive(method).with_verification(!no_verify);
            if let Some(block_size) = block_size {
                directive = directive.with_block_size(block_size);
            }
            if let Some(timeout) = timeout {
                directive = directive.with_timeout(timeout.into());
            }

            let job = WipeJob::new(target, device, directive);
            let mut pipeline = build_pipeline(&config, provision)?;
            install_interrupt_handler(pipeline.cancel_flag().clone())?;

            let result = tokio::task::spawn_blocking(move || pipeline.run_one(&job))
                .await
                .context("Wipe task failed to complete")?;

            match result {
                Ok(operation) => {
                    print_operation(&operation);
                    Ok(operation.is_success())
                }
                Err(fault) => {
                    print_operation(&fault.operation);
                    eprintln!(
                        "{} {} stage faulted: {}",
                        "Fault:".red().bold(),
                        fault.stage,
                        fault.message
                    );
                    Ok(false)
                }
            }
        }

        Commands::Batch {
            manifest,
            glob,
            method,
            stop_on_error,
        } => {
            let jobs = match (manifest, glob) {
                (Some(path), _) => jobs_from_manifest(&path, &config, method)?,
                (None, Some(pattern)) => jobs_from_glob(&pattern, &config, method)?,
                (None, None) => bail!("Either a manifest or --glob is required"),
            };
            if jobs.is_empty() {
                println!("{}", "No targets selected".yellow());
                return Ok(true);
            }

            println!("Wiping {} target(s)...", jobs.len());
            let mut pipeline = build_pipeline(&config, false)?;
            install_interrupt_handler(pipeline.cancel_flag().clone())?;

            let summary = tokio::task::spawn_blocking(move || pipeline.run_batch(&jobs, !stop_on_error))
                .await
                .context("Batch task failed to complete")?;

            for operation in summary.operations() {
                print_operation(operation);
            }
            print_batch_summary(&summary);
            Ok(summary.failed() == 0 && summary.status() == BatchStatus::Completed)
        }

        Commands::Policy => {
            print_policy();
            Ok(true)
        }

        Commands::Ledger { command } => {
            let ledger = LocalLedger::connect(&config.ledger_endpoint)?;
            match command {
                LedgerCommands::Verify => match ledger.verify_chain() {
                    Ok(entries) => {
                        println!(
                            "{} {} entries at {}",
                            "Chain intact:".green().bold(),
                            entries,
                            ledger.endpoint()
                        );
                        Ok(true)
                    }
                    Err(e) => {
                        println!("{} {}", "Chain broken:".red().bold(), e);
                        Ok(false)
                    }
                },
                LedgerCommands::Show { reference } => {
                    let record = ledger.get_record(&LedgerReference::new(reference))?;
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(true)
                }
            }
        }

        Commands::VerifyCert { file } => verify_certificate_file(&file, &config),

        Commands::History { limit } => {
            let store = SqliteOperationStore::open(&config.database_path)?;
            let operations = store.recent(limit)?;

            if operations.is_empty() {
                println!("No operations recorded in {}", store.db_path().display());
            }
            for operation in &operations {
                let state = format!("{:<10}", operation.state.to_string());
                let state = if operation.is_success() {
                    state.green()
                } else {
                    state.red()
                };
                println!(
                    "{}  {} {:<8} {:<14} {}",
                    operation.last_updated.format("%Y-%m-%d %H:%M:%S"),
                    state,
                    operation.directive.method.to_string(),
                    operation.device.id(),
                    operation.target.display()
                );
            }

            let summary = store.summary()?;
            println!(
                "\nTotal: {}  Successful: {}  Failed: {}  Success rate: {:.1}%",
                summary.total,
                summary.successful,
                summary.failed,
                summary.success_rate * 100.0
            );
            if let Some(avg) = summary.average_wipe_duration_ms {
                println!("Average wipe duration: {:.0} ms", avg);
            }
            Ok(true)
        }
    }
}

fn build_pipeline(config: &AppConfig, provision: bool) -> Result<PipelineOrchestrator> {
    let scratch = if provision {
        Some(config.scratch_size_bytes.unwrap_or(DEFAULT_SCRATCH_SIZE))
    } else {
        config.scratch_size_bytes
    };

    let engine = WipeEngine::new(Arc::new(FileDeviceAccess::new()))
        .with_operator_id(config.operator_id.clone())
        .with_destroy_time_unit(config.destroy_time_unit())
        .with_scratch_provisioning(scratch);

    let ledger = Arc::new(
        LocalLedger::connect(&config.ledger_endpoint).context("Failed to open ledger")?,
    );
    let issuer = JsonCertificateIssuer::new(config.signing_key.clone())
        .with_output_dir(config.certificates_dir.clone())
        .with_ledger(ledger.clone());
    let store = SqliteOperationStore::open(&config.database_path)?;

    Ok(PipelineOrchestrator::new(
        engine,
        Arc::new(Sha256HashGenerator::new()),
        ledger,
        Arc::new(issuer),
        Arc::new(store),
    )
    .with_retry_policy(config.retry_policy()))
}

fn describe_target(
    target: &Path,
    device_id: Option<String>,
    class: Option<DeviceClass>,
) -> Result<DeviceDescriptor> {
    let inferred = DeviceDescriptor::from_path(target);
    if device_id.is_none() && class.is_none() {
        return Ok(inferred);
    }

    let id = device_id.unwrap_or_else(|| inferred.id().to_string());
    let mut descriptor = DeviceDescriptor::new(id, class.unwrap_or(inferred.class()))?;
    if let Some(capacity) = inferred.declared_capacity() {
        descriptor = descriptor.with_declared_capacity(capacity);
    }
    Ok(descriptor)
}

fn jobs_from_manifest(path: &Path, config: &AppConfig, method: WipeMethod) -> Result<Vec<WipeJob>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&raw).context("Manifest must be a JSON array of targets")?;

    entries
        .into_iter()
        .map(|entry| {
            let device = describe_target(&entry.target, entry.device_id, entry.class)?;
            let directive = config.directive(entry.method.unwrap_or(method));
            Ok(WipeJob::new(entry.target, device, directive))
        })
        .collect()
}

fn jobs_from_glob(pattern: &str, config: &AppConfig, method: WipeMethod) -> Result<Vec<WipeJob>> {
    let mut jobs = Vec::new();
    for entry in glob::glob(pattern).context("Invalid glob pattern")? {
        let target = entry.context("Failed to read glob match")?;
        let device = DeviceDescriptor::from_path(&target);
        jobs.push(WipeJob::new(target, device, config.directive(method)));
    }
    Ok(jobs)
}

fn install_interrupt_handler(cancel: CancelFlag) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;

    std::thread::spawn(move || {
        for signal in signals.forever() {
            eprintln!(
                "\n{} finishing the current block, remaining targets will be skipped",
                "Interrupt received:".yellow().bold()
            );
            tracing::warn!(signal, "Cancellation requested");
            cancel.cancel();
        }
    });

    Ok(())
}

fn verify_certificate_file(path: &Path, config: &AppConfig) -> Result<bool> {
    let certificate = JsonCertificateIssuer::load_certificate(path)?;
    let issuer = JsonCertificateIssuer::new(config.signing_key.clone());

    println!("Certificate: {}", certificate.certificate_id);
    println!(
        "Device:      {} ({})",
        certificate.device.device_id, certificate.device.class
    );
    println!(
        "Wipe:        {} pass(es) of {}, {} bytes",
        certificate.wipe_details.passes_completed,
        certificate.wipe_details.method,
        certificate.wipe_details.bytes_wiped
    );

    let signature_ok = issuer.verify_certificate(&certificate)?;
    if signature_ok {
        println!("{} signature valid", "✓".green());
    } else {
        println!("{} signature does not match", "✗".red());
    }

    let evidence = &certificate.evidence;
    let ledger_ok = match LocalLedger::connect(&config.ledger_endpoint)
        .and_then(|ledger| ledger.get_record(&evidence.ledger_reference))
    {
        Ok(record) if record.digest == evidence.content_hash => {
            println!(
                "{} ledger record {} matches ({} confirmations)",
                "✓".green(),
                record.reference,
                record.confirmations
            );
            true
        }
        Ok(record) => {
            println!(
                "{} ledger record {} holds a different digest",
                "✗".red(),
                record.reference
            );
            false
        }
        Err(e) => {
            println!("{} ledger evidence unavailable: {}", "?".yellow(), e);
            false
        }
    };

    Ok(signature_ok && ledger_ok)
}

fn print_operation(operation: &PipelineOperation) {
    let marker = if operation.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{} {} [{}] {}",
        marker,
        operation.target.display(),
        operation.state,
        operation.operation_id
    );

    if let Some(outcome) = &operation.wipe_outcome {
        println!(
            "    {} on {}: {} pass(es), {} bytes, {}",
            outcome.method,
            outcome.device_id,
            outcome.passes_completed,
            outcome.bytes_wiped,
            humantime::format_duration(outcome.duration().to_std().unwrap_or_default())
        );
    }
    if let Some(hash) = &operation.content_hash {
        println!("    content hash: {}", hash);
    }
    if let Some(reference) = &operation.ledger_reference {
        println!("    ledger:       {}", reference);
    }
    if let Some(certificate) = &operation.certificate {
        match &certificate.path {
            Some(path) => println!("    certificate:  {}", path.display()),
            None => println!("    certificate:  {}", certificate.certificate_id),
        }
    }
    if let Some(failure) = &operation.failure {
        println!("    {} {}: {}", "failed at".red(), failure.stage, failure.reason);
    }
}

fn print_batch_summary(summary: &BatchRunSummary) {
    println!("\n{}", "=".repeat(60));
    println!(
        "Batch {}: {}/{} processed, {} succeeded, {} failed",
        summary.status(),
        summary.processed(),
        summary.requested(),
        summary.successful().to_string().green(),
        summary.failed().to_string().red()
    );
    if summary.is_partial() {
        println!(
            "{} {} target(s) were not attempted",
            "Partial:".yellow().bold(),
            summary.requested() - summary.processed()
        );
    }
}

fn print_policy() {
    println!("{:<8} {:<7} {:<7} PATTERNS", "METHOD", "CLASS", "PASSES");
    for method in WipeMethod::ALL {
        for class in DeviceClass::ALL {
            let patterns: Vec<String> = PatternPolicy::plan(method, class)
                .iter()
                .map(ToString::to_string)
                .collect();
            let passes = PatternPolicy::required_passes(method, class);
            let patterns = if method == WipeMethod::Destroy {
                "destruction".to_string()
            } else {
                patterns.join(", ")
            };
            println!(
                "{:<8} {:<7} {:<7} {}",
                method.to_string(),
                class.to_string(),
                passes,
                patterns
            );
        }
    }
}
