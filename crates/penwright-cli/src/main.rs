//! Penwright CLI - generate articles from the command line.
//!
//! Logs go to stderr (`RUST_LOG` overrides the default filter); results are
//! printed to stdout as JSON.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use penwright_core::ResponseHealer;
use penwright_runtime::discovery;
use penwright_runtime::{
    GenerationRequest, OrchestratorBuilder, ProgressStage, ProviderRegistry, RuntimeConfig,
};

#[derive(Parser)]
#[command(name = "penwright")]
#[command(about = "Resilient LLM article generation", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one article
    Generate(GenerateArgs),

    /// Recover a JSON payload from a raw model response
    Heal(HealArgs),

    /// Print the default configuration, or validate a configuration file
    Config {
        /// Configuration file to validate
        #[arg(long)]
        check: Option<PathBuf>,
    },

    /// List compiled-in providers and their default models
    Providers,
}

#[derive(Args)]
struct GenerateArgs {
    /// Article topic
    #[arg(long)]
    topic: String,

    /// YAML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Provider type, overriding the configuration
    #[arg(long)]
    provider: Option<String>,

    /// Model, overriding the configuration
    #[arg(long)]
    model: Option<String>,

    /// Skip discovery subtasks
    #[arg(long)]
    no_discovery: bool,

    /// Report progress on stderr
    #[arg(long)]
    progress: bool,

    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct HealArgs {
    /// File holding the raw response; stdin when absent
    file: Option<PathBuf>,

    /// Field the payload must contain
    #[arg(long, default_value = penwright_core::DEFAULT_REQUIRED_FIELD)]
    field: String,

    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "penwright=debug" } else { "penwright=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Generate(args) => generate(args).await,
        Command::Heal(args) => heal(args),
        Command::Config { check: Some(path) } => {
            RuntimeConfig::from_yaml_file(&path)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            println!("{}: ok", path.display());
            Ok(())
        }
        Command::Config { check: None } => {
            print!("{}", RuntimeConfig::default().to_yaml()?);
            Ok(())
        }
        Command::Providers => {
            let providers = ProviderRegistry::with_defaults();
            for kind in providers.available_types() {
                let model = providers.default_model(kind).unwrap_or("-");
                println!("{kind:<12} {model}");
            }
            Ok(())
        }
    }
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(kind) = args.provider {
        config.provider.kind = kind;
    }
    if let Some(model) = args.model {
        config.provider.model = Some(model);
    }

    let providers = ProviderRegistry::with_defaults();
    let kind = config.provider.kind.as_str();
    let default_model = providers.default_model(kind).with_context(|| {
        format!(
            "unknown provider '{kind}', available: {}",
            providers.available_types().join(", ")
        )
    })?;
    let provider = providers
        .create(kind, &config.provider.options)
        .with_context(|| format!("failed to create provider '{kind}'"))?;
    tracing::debug!(
        config = ?args.config,
        provider = kind,
        model = config.provider.model.as_deref().unwrap_or(default_model),
        discovery = !args.no_discovery,
        "Provider selected"
    );

    let mut builder = OrchestratorBuilder::from_config(&config)
        .provider(provider)
        .completion_config(config.provider.completion_config(default_model));

    if !args.no_discovery {
        for service in discovery::build_services(&config.discovery.services)? {
            builder = builder.discovery(service);
        }
    }
    if args.progress {
        builder = builder.progress(Arc::new(
            |stage: ProgressStage, percent: u8, message: &str| {
                eprintln!("[{percent:>3}%] {stage}: {message}");
            },
        ));
    }

    let orchestrator = builder.build()?;
    let result = orchestrator
        .generate(&GenerationRequest::new(args.topic))
        .await?;

    print_json(&result, args.pretty)
}

fn heal(args: HealArgs) -> Result<()> {
    let raw = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read stdin")?;
            raw
        }
    };

    let result = ResponseHealer::new(args.field.as_str()).heal(&raw);
    print_json(&result, args.pretty)?;

    if !result.ok {
        bail!("no JSON object with '{}' could be recovered", args.field);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
