//! eventparse CLI: extract a calendar event from text.
//!
//! Usage:
//!   eventparse parse <TEXT> [--secondary TEXT] [--reference-time RFC3339] [--audit]
//!   eventparse config [--config path]

use clap::{Parser, Subcommand};
use eventparse::{
    CommandSource, ExtractionPipeline, ExtractionRequest, Field, PipelineConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "eventparse",
    version,
    about = "Confidence-routed calendar event extraction"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an event and print the response as JSON
    Parse {
        /// Text to extract from
        text: String,
        /// A second fragment to merge when complementary
        #[arg(long)]
        secondary: Option<String>,
        /// "Now" for relative expressions (default: current local time)
        #[arg(long)]
        reference_time: Option<String>,
        /// Timezone name reported on the event (default: reference offset)
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long, default_value = "en")]
        locale: String,
        /// Comma-separated field subset, e.g. title,start
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<Field>>,
        /// Include per-field results
        #[arg(long)]
        audit: bool,
        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Print the effective configuration as YAML
    Config,
}

/// `~/.config/eventparse/config.yaml`, when it exists
fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("eventparse").join("config.yaml");
    path.exists().then_some(path)
}

fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig, String> {
    match explicit.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => PipelineConfig::load(&path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e)),
        None => Ok(PipelineConfig::default()),
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_request(
    text: String,
    secondary: Option<String>,
    reference_time: Option<String>,
    timezone: Option<String>,
    locale: String,
    fields: Option<Vec<Field>>,
    audit: bool,
) -> Result<ExtractionRequest, String> {
    let reference = match reference_time {
        Some(raw) => chrono::DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| format!("Invalid --reference-time '{}': {}", raw, e))?,
        None => chrono::Local::now().fixed_offset(),
    };

    let mut request = ExtractionRequest::new(text, reference).with_locale(locale);
    if let Some(secondary) = secondary {
        request = request.with_secondary(secondary);
    }
    if let Some(timezone) = timezone {
        request = request.with_timezone(timezone);
    }
    if let Some(fields) = fields {
        request = request.with_fields(fields);
    }
    if audit {
        request = request.with_audit();
    }
    Ok(request)
}

fn cmd_parse(config: PipelineConfig, request: ExtractionRequest, no_cache: bool) -> i32 {
    let source = CommandSource::from_config(&config.enhancer);
    let mut pipeline = ExtractionPipeline::new(config);
    if let Some(source) = source {
        pipeline = pipeline.with_enhancer(Arc::new(source));
    }
    if no_cache {
        pipeline = pipeline.without_cache();
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    match rt.block_on(pipeline.extract(&request)) {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: failed to render response: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

fn cmd_config(config: &PipelineConfig) -> i32 {
    match config.to_yaml() {
        Ok(yaml) => {
            print!("{}", yaml);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Parse {
            text,
            secondary,
            reference_time,
            timezone,
            locale,
            fields,
            audit,
            no_cache,
        } => match build_request(text, secondary, reference_time, timezone, locale, fields, audit) {
            Ok(request) => cmd_parse(config, request, no_cache),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Config => cmd_config(&config),
    };
    std::process::exit(code);
}
