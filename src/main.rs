mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mediafetch::config::Config;
use mediafetch::orchestrator::DownloadManager;
use tracing::info;
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    if let Commands::Config = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    // Extractions run on the blocking pool, so its size is the worker count.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.downloads.worker_threads)
        .build()?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Server(args) => {
                let address = args.address.unwrap_or(config.server.bind_addr);
                mediafetch::api::run(address, config).await
            }
            Commands::Sweep(args) => {
                let ttl = args
                    .older_than
                    .map(|d| d.as_duration())
                    .unwrap_or_else(|| config.cleanup.ttl.as_duration());
                let manager = DownloadManager::from_config(&config);
                let removed = mediafetch::cleanup::run_sweep(&manager, ttl).await;
                info!(removed, root = %config.downloads.root.display(), "Sweep finished");
                println!("{removed}");
                Ok(())
            }
            Commands::Config => Ok(()),
        }
    })
}
