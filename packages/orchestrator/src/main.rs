//! Gravity Orchestrator
//!
//! Runs the validator-side loops of the Gravity bridge: claiming Ethereum
//! events on Cosmos, confirming valsets and batches, requesting batches and
//! relaying signed artifacts to the Gravity contract. The remaining
//! subcommands are one-shot helpers for operators.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use gravity_rs::parse_address;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use orchestrator::config::{Config, LogFormat};
use orchestrator::cosmos::broadcast::parse_coin;
use orchestrator::cosmos::sink::QueueFlusher;
use orchestrator::cosmos::{BroadcastClient, CosmosTxSink, LcdQueryClient};
use orchestrator::endpoint_pool::EndpointPool;
use orchestrator::evm::gravity_contract::GasAdjustments;
use orchestrator::evm::{AlloyEvmProvider, GravityContract, SharedPendingInputs};
use orchestrator::group::TaskGroup;
use orchestrator::price_feed::{CoinGeckoPriceFeed, PriceFeed};
use orchestrator::signer::{EthSigner, LocalEthSigner};
use orchestrator::{fetch_params, Collaborators, Orchestrator, OrchestratorSettings};

/// Timeout applied to every EVM RPC call.
const EVM_RPC_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout applied to every Cosmos query.
const COSMOS_QUERY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Parser)]
#[command(name = "gravity-orchestrator")]
#[command(about = "Validator orchestrator for the Gravity bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator loops until interrupted (default)
    Orchestrator,

    /// Bind the configured Ethereum key and orchestrator account to a validator
    RegisterEthKey {
        /// Validator operator address (valoper)
        #[arg(long)]
        validator: String,
    },

    /// Send tokens from the orchestrator account to an Ethereum address
    SendToEth {
        /// Ethereum destination address
        #[arg(long)]
        dest: String,

        /// Amount with denom, e.g. 1000uumee
        #[arg(long)]
        amount: String,

        /// Bridge fee with denom
        #[arg(long)]
        fee: String,
    },

    /// Ask the chain to build an outgoing batch for a denom
    RequestBatch {
        #[arg(long)]
        denom: String,
    },
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_logging(config.log_format);

    config.validate()?;
    config.warn_insecure_endpoints();
    info!(
        cosmos_chain_id = %config.cosmos.chain_id,
        gravity_contract = %config.eth.gravity_address,
        eth_endpoints = config.eth.rpc_urls.len(),
        "Configuration loaded"
    );

    let result = match cli.command.unwrap_or(Commands::Orchestrator) {
        Commands::Orchestrator => run_orchestrator(&config).await,
        Commands::RegisterEthKey { validator } => register_eth_key(&config, &validator).await,
        Commands::SendToEth { dest, amount, fee } => {
            send_to_eth(&config, &dest, &amount, &fee).await
        }
        Commands::RequestBatch { denom } => request_batch(&config, &denom).await,
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Gravity orchestrator exited with error");
    }
    result
}

/// Clients shared by every subcommand.
struct Stack {
    cosmos: Arc<LcdQueryClient>,
    sink: Arc<CosmosTxSink>,
    queue: mpsc::Receiver<cosmrs::Any>,
    broadcast: Arc<BroadcastClient>,
    gravity: Arc<GravityContract>,
}

fn build_stack(config: &Config) -> Result<Stack> {
    let gravity_address = parse_address(&config.eth.gravity_address)?;
    let eth_signer = LocalEthSigner::from_hex(&config.eth.private_key)?;
    let eth_address = eth_signer.address();

    let pool = Arc::new(EndpointPool::new(config.eth.rpc_urls.clone())?);
    let evm = Arc::new(AlloyEvmProvider::new(pool, EVM_RPC_TIMEOUT));
    let gravity = GravityContract::new(evm, gravity_address)
        .with_wallet(eth_address, EthereumWallet::from(eth_signer.inner().clone()))
        .with_gas_adjustments(GasAdjustments {
            price: config.eth.gas_price_adjustment,
            limit: config.eth.gas_limit_adjustment,
        })
        .with_pending_inputs(SharedPendingInputs::default(), config.eth.pending_tx_wait());

    let cosmos = LcdQueryClient::new(
        &config.cosmos.lcd_url,
        &config.cosmos.tendermint_rpc,
        COSMOS_QUERY_TIMEOUT,
    )?;
    let (sink, queue) = CosmosTxSink::new(&config.cosmos)?;
    let sink = Arc::new(sink);
    let broadcast = BroadcastClient::new(
        sink.clone(),
        Arc::new(eth_signer),
        config.cosmos.account_prefix.clone(),
    );

    info!(
        eth_address = %eth_address,
        orchestrator_address = %sink.address(),
        "Signers loaded"
    );

    Ok(Stack {
        cosmos: Arc::new(cosmos),
        sink,
        queue,
        broadcast: Arc::new(broadcast),
        gravity: Arc::new(gravity),
    })
}

async fn run_orchestrator(config: &Config) -> Result<()> {
    info!("Starting Gravity orchestrator");
    let stack = build_stack(config)?;
    let retry = config.retry.policy();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_cancel.cancel();
    });

    let params = fetch_params(stack.cosmos.as_ref(), &retry, &cancel)
        .await
        .wrap_err("Failed to query bridge params")?;
    if let Ok(on_chain) = parse_address(&params.bridge_ethereum_address) {
        if on_chain != stack.gravity.address() {
            warn!(
                on_chain = %on_chain,
                configured = %stack.gravity.address(),
                "Gravity contract address differs from the chain's bridge params"
            );
        }
    }

    let settings = OrchestratorSettings::new(&params, config);
    info!(
        bridge_chain_id = params.bridge_chain_id,
        start_height = settings.bridge_start_height,
        oracle_interval = ?settings.oracle_interval,
        signer_interval = ?settings.signer_interval,
        relayer_interval = ?settings.relayer.loop_duration,
        "Bridge params loaded"
    );

    let price_feed: Option<Arc<dyn PriceFeed>> = if config.relayer.min_batch_fee_usd > 0.0 {
        Some(Arc::new(CoinGeckoPriceFeed::new(
            &config.relayer.coingecko_api,
        )?))
    } else {
        None
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Collaborators {
            cosmos: stack.cosmos,
            broadcast: stack.broadcast,
            gravity: stack.gravity,
            price_feed,
        },
        settings,
        retry,
    ));

    let mut group = TaskGroup::new(&cancel);
    let flusher = QueueFlusher::new(
        stack.sink,
        stack.queue,
        config.cosmos.msgs_per_tx,
        Duration::from_millis(config.cosmos.queue_flush_ms),
    );
    group.spawn("queue_flusher", flusher.run(group.token()));
    orchestrator.spawn(&mut group);

    group.join().await?;
    info!("Gravity orchestrator stopped");
    Ok(())
}

async fn register_eth_key(config: &Config, validator: &str) -> Result<()> {
    let stack = build_stack(config)?;
    let response = stack
        .broadcast
        .update_orchestrator_addresses(validator)
        .await?;
    info!(
        tx_hash = %response.tx_hash,
        height = response.height,
        validator,
        "Ethereum key registered"
    );
    Ok(())
}

async fn send_to_eth(config: &Config, dest: &str, amount: &str, fee: &str) -> Result<()> {
    let destination: Address = parse_address(dest)?;
    let amount = parse_coin(amount)?;
    let fee = parse_coin(fee)?;

    let stack = build_stack(config)?;
    stack.broadcast.send_to_eth(destination, amount, fee).await?;
    flush_queue(config, stack).await
}

async fn request_batch(config: &Config, denom: &str) -> Result<()> {
    let stack = build_stack(config)?;
    stack.broadcast.send_request_batch(denom).await?;
    flush_queue(config, stack).await
}

/// Broadcast whatever the one-shot command queued.
async fn flush_queue(config: &Config, stack: Stack) -> Result<()> {
    let flusher = QueueFlusher::new(
        stack.sink,
        stack.queue,
        config.cosmos.msgs_per_tx,
        Duration::from_millis(config.cosmos.queue_flush_ms),
    );
    for tx_hash in flusher.drain().await? {
        info!(tx_hash = %tx_hash, "Transaction broadcast");
    }
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,orchestrator=debug,gravity_rs=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init(),
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
