mod cli;
mod config_loader;
mod keys;

use anyhow::Context;
use clap::Parser;
use cli::Commands;
use spout_client::api::ApiServer;
use spout_client::{
    BlockchainRpcClient, ClientConfig, ConnectionPhase, GasSettings, LocalIdentityProvider,
    RpcLedgerGateway, SessionDatabase, SessionManager, SessionSettings, SessionState,
};
use spout_common::utils::logging::init_logging;
use spout_common::utils::metrics::SessionMetrics;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI and load config
    let args = cli::Cli::parse();
    let config = config_loader::load_client_config(&args.config, &args)?;

    // 2. Setup Logging
    let _log_guard = init_logging(&config.logging)?;
    info!("Loaded config from {:?}", args.config);

    let command = args.command.clone().unwrap_or(Commands::Serve { addr: None });
    if let Commands::GenerateKey { out } = &command {
        let path = out
            .clone()
            .or_else(|| config.key_file.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("spout.key"));
        let key = keys::load_or_generate_key(&path)?;
        println!("Signing key at {:?}", path);
        println!("Address: {}", spout_client::keystore::address_of(&key));
        return Ok(());
    }

    // 3. Wire collaborators
    let signing_key = keys::load_signing_key(&config)?;
    let database = Arc::new(
        SessionDatabase::new(&config.db_path)
            .with_context(|| format!("Failed to open session database at {}", config.db_path))?,
    );
    let rpc = Arc::new(BlockchainRpcClient::new(config.rpc_url.clone()));
    let identity = Arc::new(LocalIdentityProvider::new(
        signing_key,
        rpc.clone(),
        database.clone(),
        GasSettings {
            gas_price: config.gas_price()?,
            fallback_gas_limit: config.gas_limit,
        },
        config.receipt_poll_interval(),
    ));
    let gateway = Arc::new(RpcLedgerGateway::new(rpc, identity.clone(), config.faucet_address()?));
    let metrics = Arc::new(SessionMetrics::new().context("Failed to register metrics")?);
    let session = Arc::new(SessionManager::new(
        gateway,
        identity.clone(),
        SessionSettings::from_config(&config),
        metrics,
        Some(database),
    ));
    info!("Faucet {} via {}", config.faucet_address, config.rpc_url);

    // 4. Run command
    match command {
        Commands::Serve { addr } => serve(session, &config, addr).await,
        Commands::Status => {
            ensure_connected(&session).await?;
            print_state(&session.state());
            match session.faucet_info().await {
                Ok(info) => {
                    println!("Owner:            {}", info.owner);
                    println!("Token:            {}", info.token);
                    println!("Daily cap:        {}", info.max_tokens_per_day);
                    match info.last_auto_mint {
                        Some(at) => println!("Last auto-mint:   {}", at.to_rfc3339()),
                        None => println!("Last auto-mint:   never"),
                    }
                }
                Err(e) => warn!("Could not read faucet parameters: {}", e),
            }
            Ok(())
        }
        Commands::Request { amount } => {
            ensure_connected(&session).await?;
            let confirmation = session.request_tokens(&amount).await?;
            println!("Withdrew {} in {}", amount, confirmation.receipt.tx_hash);
            print_state(&session.state());
            Ok(())
        }
        Commands::AutoMint => {
            ensure_connected(&session).await?;
            let confirmation = session.trigger_replenishment().await?;
            println!(
                "Auto-mint {:?} in {}",
                confirmation.receipt.outcome, confirmation.receipt.tx_hash
            );
            print_state(&session.state());
            Ok(())
        }
        Commands::ForceAutoMint => {
            ensure_connected(&session).await?;
            let confirmation = session.force_replenishment().await?;
            println!("Forced auto-mint in {}", confirmation.receipt.tx_hash);
            print_state(&session.state());
            Ok(())
        }
        Commands::Revoke => {
            if identity.revoke_access()? {
                println!("Authorization revoked");
            } else {
                println!("No authorization stored");
            }
            Ok(())
        }
        Commands::History { limit } => {
            for record in session.history(limit)? {
                let status = match (&record.outcome, &record.error) {
                    (Some(outcome), _) => format!("{:?}", outcome),
                    (None, Some(error)) => error.clone(),
                    (None, None) => "unknown".to_string(),
                };
                let amount = record.amount.map(|a| a.to_string()).unwrap_or_default();
                println!(
                    "{}  {:<9} {:>12}  {}  {}",
                    record.timestamp,
                    record.kind.label(),
                    amount,
                    record.address,
                    status
                );
            }
            Ok(())
        }
        Commands::GenerateKey { .. } => Ok(()),
    }
}

/// Resume a stored authorization, or ask for one.
async fn ensure_connected(session: &SessionManager) -> anyhow::Result<()> {
    if session.start().await? != ConnectionPhase::Connected {
        session.connect().await?;
    }
    Ok(())
}

async fn serve(session: Arc<SessionManager>, config: &ClientConfig, addr: Option<String>) -> anyhow::Result<()> {
    if let Err(e) = session.start().await {
        warn!("Could not resume session: {}", e);
    }

    let mut updates = session.subscribe();
    tokio::spawn(async move {
        let mut phase = updates.borrow().phase;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.phase != phase {
                info!("Session phase: {:?} -> {:?}", phase, state.phase);
                phase = state.phase;
            }
            if let Some(error) = &state.last_error {
                tracing::debug!("Last error: {}", error.message);
            }
        }
    });

    let addr = addr.unwrap_or_else(|| config.api_addr.clone());
    let server = ApiServer::new(session.clone(), config.metrics_enabled, config.cors_enabled);
    server.start(&addr, shutdown_signal()).await?;

    session.disconnect();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

fn print_state(state: &SessionState) {
    println!("Phase:            {:?}", state.phase);
    if let Some(identity) = &state.identity {
        println!("Account:          {}", identity.address);
    }
    match &state.latest_snapshot {
        Some(snapshot) => {
            println!("Faucet balance:   {}", snapshot.faucet_balance());
            println!("Your allowance:   {}", snapshot.caller_allowance_remaining());
            println!("Next auto-mint:   {}", snapshot.cooldown_formatted());
            println!("Auto-mint ready:  {}", snapshot.is_auto_mint_available());
        }
        None => println!("Faucet state:     unavailable"),
    }
    if let Some(error) = &state.last_error {
        println!("Last error:       {}", error.message);
    }
}
