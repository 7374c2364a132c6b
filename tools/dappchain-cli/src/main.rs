//! dappchain: command-line client for a DAppChain node.
//!
//! Reads go to the query endpoint; `call` and `deploy` go through the
//! nonce and signing stages and wait for the deliver-confirmation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dappchain_client::{ChainClient, ClientConfig, EventListener, NoncePolicy};
use dappchain_crypto::Ed25519KeyPair;
use dappchain_types::{Address, ChainEvent, VmType};

/// Command-line client for a DAppChain node
#[derive(Parser, Debug)]
#[command(name = "dappchain")]
#[command(about = "Commit transactions, run queries and watch events on a DAppChain node")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chain id (overrides the config file)
    #[arg(long)]
    chain_id: Option<String>,

    /// Write endpoint URL (overrides the config file)
    #[arg(long)]
    write_url: Option<String>,

    /// Read endpoint URL (overrides the config file)
    #[arg(long)]
    read_url: Option<String>,

    /// Event endpoint URL (overrides the config file)
    #[arg(long)]
    events_url: Option<String>,

    /// Hex Ed25519 secret key; a throwaway key is used when omitted
    #[arg(long, env = "DAPPCHAIN_SECRET_HEX", hide_env_values = true)]
    secret_hex: Option<String>,

    /// Reuse the last accepted nonce instead of asking the node every time
    #[arg(long)]
    local_nonce: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the address controlled by the secret key
    Address,

    /// Print the last accepted sequence number of an account
    Nonce {
        /// Account as `chain:0xhex` (defaults to the key's address)
        account: Option<Address>,
    },

    /// Resolve a registered contract name
    Resolve { name: String },

    /// Run a read-only query
    Query {
        contract: Address,
        /// Hex-encoded input
        #[arg(long, default_value = "")]
        input: String,
        #[arg(long, value_enum, default_value_t = Vm::Evm)]
        vm: Vm,
    },

    /// Commit a contract call
    Call {
        contract: Address,
        /// Hex-encoded input
        #[arg(long, default_value = "")]
        input: String,
        #[arg(long, value_enum, default_value_t = Vm::Evm)]
        vm: Vm,
    },

    /// Deploy contract code
    Deploy {
        /// Hex-encoded code
        code: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, value_enum, default_value_t = Vm::Evm)]
        vm: Vm,
    },

    /// Fetch an EVM transaction receipt
    Receipt {
        /// Hex-encoded transaction hash
        tx_hash: String,
    },

    /// Print events emitted by a contract until interrupted
    Watch { contract: Address },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Vm {
    Plugin,
    Evm,
}

impl From<Vm> for VmType {
    fn from(vm: Vm) -> Self {
        match vm {
            Vm::Plugin => VmType::Plugin,
            Vm::Evm => VmType::Evm,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ClientConfig::from_toml_str(&text)?
        }
        None => ClientConfig::default(),
    };

    if let Some(chain_id) = &args.chain_id {
        config.chain_id = chain_id.clone();
    }
    if let Some(url) = &args.write_url {
        config.endpoints.write_url = url.clone();
    }
    if let Some(url) = &args.read_url {
        config.endpoints.read_url = url.clone();
    }
    if let Some(url) = &args.events_url {
        config.endpoints.events_url = url.clone();
    }
    if args.local_nonce {
        config.nonce.policy = NoncePolicy::LocalIncrement;
    }

    config.validate()?;
    Ok(config)
}

fn load_key(args: &Args) -> Result<Ed25519KeyPair> {
    match &args.secret_hex {
        Some(secret) => Ed25519KeyPair::from_secret_hex(secret).context("invalid secret key"),
        None => Ok(Ed25519KeyPair::generate()),
    }
}

fn decode_hex(label: &str, value: &str) -> Result<Vec<u8>> {
    let value = value.trim_start_matches("0x");
    hex::decode(value).with_context(|| format!("{label} is not valid hex"))
}

fn print_event(event: &ChainEvent) {
    let line = serde_json::json!({
        "contract": event.contract.to_string(),
        "caller": event.caller.as_ref().map(ToString::to_string),
        "topics": event.topics,
        "block_height": event.block_height,
        "plugin_name": event.plugin_name,
        "body": hex::encode(&event.body),
        "tx_hash": hex::encode(&event.tx_hash),
    });
    println!("{line}");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = load_config(&args)?;
    let key = Arc::new(load_key(&args)?);
    let client = Arc::new(ChainClient::from_config(&config, key)?);
    let me = client
        .signer_address()
        .context("client has no signing stage")?;

    match args.command {
        Command::Address => println!("{me}"),

        Command::Nonce { account } => {
            let account = account.unwrap_or(me);
            println!("{}", client.nonce(&account).await?);
        }

        Command::Resolve { name } => match client.resolve_contract(&name).await? {
            Some(address) => println!("{address}"),
            None => bail!("no contract registered as {name:?}"),
        },

        Command::Query { contract, input, vm } => {
            let input = decode_hex("input", &input)?;
            match client.query(&contract, input, &me, vm.into()).await? {
                Some(output) => println!("0x{}", hex::encode(output)),
                None => println!("(empty)"),
            }
        }

        Command::Call { contract, input, vm } => {
            let input = decode_hex("input", &input)?;
            let result = client.call(&me, &contract, vm.into(), input).await?;
            info!(height = result.height, "Call committed");
            println!(
                "{}",
                serde_json::json!({
                    "hash": result.hash,
                    "height": result.height,
                    "data": hex::encode(&result.data),
                })
            );
        }

        Command::Deploy { code, name, vm } => {
            let code = decode_hex("code", &code)?;
            let deployed = client.deploy(&me, vm.into(), code, &name).await?;
            println!(
                "{}",
                serde_json::json!({
                    "contract": deployed.contract.to_string(),
                    "hash": deployed.broadcast.hash,
                    "height": deployed.broadcast.height,
                    "output": hex::encode(&deployed.output),
                })
            );
        }

        Command::Receipt { tx_hash } => {
            let tx_hash = decode_hex("tx_hash", &tx_hash)?;
            match client.evm_tx_receipt(&tx_hash).await? {
                Some(receipt) => println!(
                    "{}",
                    serde_json::json!({
                        "block_number": receipt.block_number,
                        "status": receipt.status,
                        "gas_used": receipt.gas_used,
                        "contract_address": hex::encode(&receipt.contract_address),
                        "logs": receipt.logs.len(),
                    })
                ),
                None => bail!("no receipt for 0x{}", hex::encode(&tx_hash)),
            }
        }

        Command::Watch { contract } => {
            let listener: Arc<dyn EventListener> = Arc::new(print_event);
            let _guard = client.events()?.subscribe(contract.clone(), listener).await?;
            info!(contract = %contract, "Watching events, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}
