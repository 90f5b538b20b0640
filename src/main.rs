use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cloudtab::cloud::{format_api_error, provider_for, RestSource};
use cloudtab::collect::{generate, Account, Collector, ProviderKind};
use cloudtab::config::Config;
use cloudtab::output::{render, OutputFormat};
use cloudtab::table::SchemaRegistry;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Collect cloud resource inventories as table rows
#[derive(Parser, Debug)]
#[command(name = "cloudtab", version = cloudtab::VERSION, about, long_about = None)]
struct Args {
    /// Table to generate (see --list-tables)
    #[arg(required_unless_present = "list_tables")]
    table: Option<String>,

    /// List known tables and exit
    #[arg(long)]
    list_tables: bool,

    /// GCP project(s) to collect from, overrides the config file
    #[arg(short, long)]
    project: Vec<String>,

    /// Azure subscription(s) to collect from, overrides the config file
    #[arg(short, long)]
    subscription: Vec<String>,

    /// Config file (default: <config dir>/cloudtab/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of concurrent scope workers
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudtab started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudtab").join("cloudtab.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudtab").join("cloudtab.log");
    }
    PathBuf::from("cloudtab.log")
}

fn load_config(args: &Args) -> Result<Config> {
    match &args.config {
        Some(path) => Config::load_from(path),
        None => Ok(Config::load()),
    }
}

fn load_registry(config: &Config) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::builtin()?;
    if let Some(dir) = &config.tables_dir {
        registry.load_dir(dir)?;
    }
    Ok(registry)
}

/// Accounts for `provider` (CLI > config > implicit default)
fn accounts_for(args: &Args, config: &Config, provider: ProviderKind) -> Vec<Account> {
    let cli = match provider {
        ProviderKind::Gcp => &args.project,
        ProviderKind::Azure => &args.subscription,
    };
    if cli.is_empty() {
        config.accounts(provider)
    } else {
        cli.iter().map(|id| Account::new(id)).collect()
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let registry = load_registry(&config)?;

    if args.list_tables {
        for name in registry.table_names() {
            println!("{}", name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let Some(table) = args.table.as_deref() else {
        return Ok(ExitCode::FAILURE);
    };

    let def = match registry.table(table) {
        Ok(def) => def.clone(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let provider = provider_for(def.provider, &config);
    let accounts = accounts_for(&args, &config, def.provider);
    let source = Arc::new(RestSource::new(table, def, provider)?);

    let cancel = CancellationToken::new();
    let collector = Collector::new(config.effective_concurrency(args.max_concurrency))
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling collection");
            cancel.cancel();
        }
    });

    let result = generate(&registry, table, source, &accounts, &collector).await?;
    let schema = registry.schema(table)?;

    print!("{}", render(&result.rows, &schema, args.format)?);

    for err in &result.errors {
        match err.cause() {
            Some(cause) => eprintln!("warning: {}: {}", err, format_api_error(cause)),
            None => eprintln!("warning: {}", err),
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
