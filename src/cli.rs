use clap::{Parser, Subcommand};
use mediafetch::humanize::HumanDuration;
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(about = "Asynchronous media download service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Run one cleanup sweep over the downloads root and exit
    Sweep(SweepArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct SweepArgs {
    /// Age threshold such as "30m" or "2h" (defaults to cleanup.ttl)
    #[arg(long)]
    pub older_than: Option<HumanDuration>,
}
