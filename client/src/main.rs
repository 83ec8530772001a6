use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use dsse_cli::keystore::Keystore;
use dsse_cli::output::{self, OutputFormat};
use dsse_cli::protocol::{self, ClientConfig};
use dsse_cli::secure;
use dsse_core::error::Error;
use dsse_core::wire;

#[derive(Parser, Debug)]
#[command(name = "dsse", version, about = "DSSE client: encrypted add/search against dssed")]
struct Cli {
    /// Server socket; a leading `@` selects the abstract namespace.
    #[arg(long, global = true, env = "DSSE_SOCKET", default_value = wire::DEFAULT_SOCKET)]
    socket: String,
    /// Encrypted key file.
    #[arg(long, global = true, env = "DSSE_KEYSTORE", default_value = "./keys.enc")]
    keystore: PathBuf,
    /// Read the keystore passphrase from a file instead of prompting.
    #[arg(long, global = true)]
    password_file: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and upload documents together with their keyword index.
    Add { paths: Vec<PathBuf> },
    /// Remove documents by id (reserved, not implemented).
    Remove { ids: Vec<String> },
    /// Search a single keyword; prints matching document ids.
    Search { keyword: String },
    /// Keystore management.
    Keys(KeysCmd),
}

#[derive(Args, Debug)]
struct KeysCmd {
    #[command(subcommand)]
    action: KeyAction,
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Create a fresh keystore (add/search also do this on demand).
    New,
    /// Re-encrypt the keystore under a new passphrase.
    ChangePassword {
        /// Read the new passphrase from a file instead of prompting.
        #[arg(long)]
        new_password_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();

    let cli = Cli::parse();
    let cfg = ClientConfig {
        socket: cli.socket,
        keystore: cli.keystore,
        password_file: cli.password_file,
    };

    match cli.cmd {
        Commands::Add { paths } => protocol::add(&cfg, &paths).await?,
        Commands::Remove { ids } => protocol::remove(&ids)?,
        Commands::Search { keyword } => {
            let results = protocol::search(&cfg, &keyword).await?;
            output::print_results(cli.output, &results)?;
        }
        Commands::Keys(kc) => match kc.action {
            KeyAction::New => {
                if cfg.keystore.exists() {
                    return Err(Error::InvalidArgument(format!(
                        "keystore already exists at {}",
                        cfg.keystore.display()
                    ))
                    .into());
                }
                let password = secure::obtain_password(cfg.password_file.as_deref(), true)?;
                Keystore::create().store(&cfg.keystore, &password)?;
                if cli.output.is_json() {
                    output::print_json(&serde_json::json!({
                        "result": "created",
                        "keystore": cfg.keystore.display().to_string(),
                    }))?;
                } else {
                    println!("keystore created at {}", cfg.keystore.display());
                }
            }
            KeyAction::ChangePassword { new_password_file } => {
                let old = secure::obtain_password(cfg.password_file.as_deref(), false)?;
                let new = secure::obtain_password(new_password_file.as_deref(), true)?;
                Keystore::change_password(&cfg.keystore, &old, &new)?;
                if cli.output.is_json() {
                    output::print_json(&serde_json::json!({ "result": "password_changed" }))?;
                } else {
                    println!("keystore passphrase changed");
                }
            }
        },
    }
    Ok(())
}
