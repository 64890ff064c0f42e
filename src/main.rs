//! ask-github - ask questions about GitHub and GitLab repositories
//!
//! A CLI tool that lets a language model explore a remote repository with
//! read-only tools and prints its answer.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any error (bad arguments, unreachable endpoint, invalid URL, etc.)

mod cli;

use anyhow::{Context, Result};
use ask_github::config::{Config, CONFIG_FILE_NAME};
use ask_github::HostRegistry;
use cli::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = match Args::parse_args() {
        Ok(args) => args,
        Err(e) => fail(e),
    };

    if let Err(e) = args.validate() {
        fail(e);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        if let Err(e) = handle_init_config() {
            fail(format!("{:#}", e));
        }
        return;
    }

    init_logging(&args);

    info!("ask-github v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("Run failed: {:#}", e);
        fail(format!("{:#}", e));
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

/// Handle --init-config: generate a default .ask-github.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("Created {} with default settings.", CONFIG_FILE_NAME);
    Ok(())
}

/// Initialize logging on stderr; `RUST_LOG` takes precedence over the flags.
fn init_logging(args: &Args) {
    let level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_ascii_lowercase()));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    args.merge_into(&mut config)?;

    let hosts = HostRegistry::from_config(&config.github, &config.gitlab)?;

    if args.tree {
        let entries =
            ask_github::list_tree_with(&hosts, args.repo_url(), true, args.token.as_deref())
                .await?;
        for entry in entries {
            println!("{}\t{}", entry.entry_type, entry.path);
        }
        return Ok(());
    }

    let options = config.ask_options(args.token.clone());
    info!(
        "Model {} at {} (max {} iterations, {} parallel tools)",
        options.completion.model,
        options.completion.base_url,
        options.max_iterations,
        options.max_parallel_tools
    );

    let llm = std::sync::Arc::new(ask_github::OpenAiClient::new(options.completion.clone())?);

    let spinner = args.shows_spinner().then(start_spinner);
    let result = ask_github::ask_with(llm, &hosts, args.repo_url(), args.prompt(), &options).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    println!("{}", result?);
    Ok(())
}

fn start_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Exploring the repository...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
