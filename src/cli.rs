use std::net::IpAddr;

use clap::{Args, Parser, Subcommand};

use crate::client::REMOTE_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the comic store server, accepting HTTP connections.
    Server(ServerArgs),
    /// Run the demo client against a remote comic store.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Address to bind, e.g. 0.0.0.0 or 127.0.0.1.
    pub address: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    pub port: u16,

    /// Number of runtime worker threads. Values below 1 are clamped to 1.
    pub threads: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Hostname or address of the comic store server.
    pub server: String,

    /// Port of the comic store server.
    #[arg(long, default_value_t = REMOTE_PORT)]
    pub port: u16,
}
