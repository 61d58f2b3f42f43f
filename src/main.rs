use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use comics_http::{
    cli::{Cli, ClientArgs, Command, ServerArgs},
    client,
    comic::{self, ComicStore},
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args),
        Command::Client(args) => run_client(args),
    }
}

fn run_server(args: ServerArgs) -> Result<()> {
    // The thread count argument sizes the reactor pool, so the runtime
    // is built by hand instead of via the tokio::main macro.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.threads.max(1))
        .enable_all()
        .build()
        .context("failed to build server runtime")?;

    runtime.block_on(async {
        let listener = TcpListener::bind((args.address, args.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", args.address, args.port))?;
        let server = Server::new(listener, comic::shared(ComicStore::load()));
        let addr = server.local_addr()?;
        info!("server listening on {}", addr);
        if let Err(err) = server.run_until_ctrl_c().await {
            warn!("server exited with error: {err:?}");
            return Err(err);
        }
        Ok(())
    })
}

fn run_client(args: ClientArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build client runtime")?;
    runtime.block_on(client::run(args))
}
