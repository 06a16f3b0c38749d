use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use osvconvert::{
    cache::Cache,
    config::Config,
    convert::{get_converter, timestamp, ConvertContext, Outcome, Record},
    lint,
    model::Vulnerability,
    normalize::SourceFormat,
    output::{print_findings, print_summary, write_record, Counts, OutputFormat},
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const LINT_FINDINGS: u8 = 2;
}

#[derive(Parser)]
#[command(name = "osvconvert")]
#[command(
    author,
    version,
    about = "Convert security advisory feeds into OSV records"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert advisory documents into OSV records
    Convert {
        /// Source format (ghsa, redhat, debian, vuxml)
        source: String,

        /// Input documents
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write one <id>.json per record into this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Summary format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Neither read nor update the cache
        #[arg(long)]
        no_cache: bool,

        /// Convert every record, then refresh the cache
        #[arg(long)]
        rebuild: bool,

        /// OSV ecosystem for VuXML packages
        #[arg(long)]
        ecosystem: Option<String>,

        /// Path to a webwml checkout for Debian details and dates
        #[arg(long)]
        webwml: Option<PathBuf>,

        /// JSON file of first package versions per Debian release
        #[arg(long)]
        first_versions: Option<PathBuf>,

        /// RFC 3339 timestamp used when a source has no modification date
        #[arg(long)]
        modified: Option<String>,
    },

    /// Check OSV records for inconsistent ranges
    Lint {
        /// OSV JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// List supported source formats
    ListFormats,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the cache
    ClearCache,
}

struct ConvertArgs {
    source: String,
    inputs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    format: String,
    no_cache: bool,
    rebuild: bool,
    modified: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Convert {
            source,
            inputs,
            output_dir,
            format,
            no_cache,
            rebuild,
            ecosystem,
            webwml,
            first_versions,
            modified,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(ecosystem) = ecosystem {
                config.vuxml.ecosystem = ecosystem;
            }
            if webwml.is_some() {
                config.debian.webwml_repo = webwml;
            }
            if first_versions.is_some() {
                config.debian.first_versions = first_versions;
            }

            let args = ConvertArgs {
                source,
                inputs,
                output_dir: output_dir.or_else(|| config.output_dir.clone()),
                format: format.unwrap_or_else(|| config.default_format.clone()),
                no_cache,
                rebuild,
                modified,
            };
            run_convert(&config, args)
        }
        Commands::Lint { files, format } => {
            let config = load_config(cli.config.as_deref())?;
            let format = format.unwrap_or_else(|| config.default_format.clone());
            run_lint(&files, &format)
        }
        Commands::ListFormats => {
            list_formats();
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(cli.config, init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let cache = Cache::new();
            cache.clear()?;
            println!("Cache cleared.");
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn run_convert(config: &Config, args: ConvertArgs) -> Result<u8> {
    let source = SourceFormat::from_str(&args.source).map_err(|e| anyhow::anyhow!(e))?;
    let format = OutputFormat::from_str(&args.format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && args.output_dir.is_some();

    let now = match &args.modified {
        Some(raw) => {
            let time = DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("Invalid --modified timestamp: {}", raw))?;
            timestamp(time.with_timezone(&Utc))
        }
        None => timestamp(Utc::now()),
    };

    let converter = get_converter(source, config)?;
    let cache = Cache::new();
    let use_cache = config.use_cache && !args.no_cache;

    let mut ctx = ConvertContext::new(now).with_ignore(&config.ignore);
    if use_cache && !args.rebuild {
        ctx = ctx.with_cache(&cache);
    }

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let mut records = Vec::new();
    for input in &args.inputs {
        if let Some(ref pb) = progress {
            pb.set_message(format!("Converting {}...", input.display()));
        }

        match converter.convert_file(input, &ctx) {
            Ok(batch) => {
                debug!(path = %input.display(), records = batch.len(), "document converted");
                records.extend(batch);
            }
            Err(error) => {
                warn!(path = %input.display(), error = %error, "unreadable {} document", converter.name());
                records.push(Record {
                    id: input.display().to_string(),
                    fingerprint: None,
                    outcome: Outcome::Failed(error),
                });
            }
        }
    }

    if let Some(ref pb) = progress {
        pb.set_message("Writing records...");
    }

    let mut findings = 0usize;
    for record in &records {
        let Some(vuln) = record.vulnerability() else {
            continue;
        };

        for finding in lint::check(vuln) {
            warn!(id = %vuln.id, code = finding.code, "{}", finding.message);
            findings += 1;
        }

        write_record(vuln, args.output_dir.as_deref())?;

        if use_cache {
            if let Some(fingerprint) = &record.fingerprint {
                cache.set(&Cache::key(source, &record.id), fingerprint)?;
            }
        }
    }

    let counts = Counts::from_records(&records);
    if let Some(pb) = progress {
        pb.finish_with_message(format!("Converted {} advisories", counts.converted));
    }
    info!(
        format = source.as_str(),
        converted = counts.converted,
        unchanged = counts.unchanged,
        ignored = counts.ignored,
        failed = counts.failed,
        lint_findings = findings,
        "conversion finished"
    );

    // Without an output directory stdout carries the records themselves
    if args.output_dir.is_some() || format == OutputFormat::Table {
        print_summary(&records, format)?;
    }

    if counts.failed > 0 {
        Ok(exit_codes::ERROR)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

fn run_lint(files: &[PathBuf], format: &str) -> Result<u8> {
    let format = OutputFormat::from_str(format).map_err(|e| anyhow::anyhow!(e))?;

    let mut findings = Vec::new();
    for file in files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let vuln: Vulnerability = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse OSV record {}", file.display()))?;

        for finding in lint::check(&vuln) {
            findings.push((file.display().to_string(), finding));
        }
    }

    print_findings(&findings, format)?;

    if findings.is_empty() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::LINT_FINDINGS)
    }
}

fn list_formats() {
    println!("Available formats:");
    println!();

    let inputs = [
        (SourceFormat::Ghsa, "GitHub Security Advisory GraphQL JSON"),
        (SourceFormat::RedHat, "CSAF 2.0 VEX JSON"),
        (SourceFormat::Debian, "security-tracker data/DSA/list"),
        (SourceFormat::Vuxml, "FreeBSD ports vuln.xml"),
    ];

    for (format, input) in inputs {
        println!("  {:<10} {:<10} {}", format.as_str(), format.display_name(), input);
    }
}

fn handle_config(explicit: Option<PathBuf>, init: bool, show_path: bool) -> Result<()> {
    let config_path = explicit.unwrap_or_else(Config::config_path);

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save_to(&config_path)?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'osvconvert config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
