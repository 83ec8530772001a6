use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use dsse_core::wire;
use dssed::dispatch::Dispatcher;

#[derive(Parser, Debug)]
#[command(name = "dssed", version, about = "DSSE server daemon")]
struct Cli {
    /// Listening socket; a leading `@` selects the abstract namespace.
    #[arg(long, env = "DSSE_SOCKET", default_value = wire::DEFAULT_SOCKET)]
    socket: String,
    /// Root directory for per-user storage.
    #[arg(long, env = "DSSE_STORAGE", default_value = "./storage")]
    storage: PathBuf,
    /// User whose state this server instance serves.
    #[arg(long, default_value = "local")]
    user: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.storage)?;

    let addr = wire::socket_addr(&cli.socket)?;
    let std_listener = std::os::unix::net::UnixListener::bind_addr(&addr)?;
    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::UnixListener::from_std(std_listener)?;
    info!(socket = %cli.socket, storage = %cli.storage.display(), "dssed listening");

    let dispatcher = Dispatcher::new(cli.storage, cli.user);

    // connections are served strictly one at a time; a failed client
    // aborts its own session only
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((mut stream, _)) => {
                        info!("client connected");
                        if let Err(e) = dispatcher.handle(&mut stream).await {
                            warn!(error = %e, "connection aborted");
                        }
                        info!("closing client connection");
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
    Ok(())
}
