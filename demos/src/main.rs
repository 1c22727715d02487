use std::{str::FromStr, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use swap_tx_builder::{
    config::payer_from_env, AggregatorClient, LedgerRpc, Quote, SlippageMode, SolanaLedger,
    SwapConfig, SwapOrchestrator, SwapRequest, TracingSink,
};
use tracing_subscriber::EnvFilter;

const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const SWAP_AMOUNT: u64 = 100_000_000;
const SLIPPAGE_BPS: u16 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::from_path("demos/.env").ok();
    init_tracing();

    let user_pubkey =
        std::env::var("USER_PUBKEY").expect("USER_PUBKEY environment variable must be set");
    let rpc_url = std::env::var("RPC_URL")
        .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());
    let aggregator_url = std::env::var("AGGREGATOR_URL")
        .ok()
        .filter(|s| !s.is_empty());
    let api_key = std::env::var("AGGREGATOR_API_KEY")
        .ok()
        .filter(|s| !s.is_empty());
    let send_tx = std::env::var("SWAP_SEND_TX")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let user_pubkey = Pubkey::from_str(&user_pubkey)?;
    let config = SwapConfig::from_env()?;
    let payer = Arc::new(payer_from_env()?);

    let ledger = Arc::new(SolanaLedger::new(
        rpc_url.clone(),
        config.rpc_timeout,
        config.confirm_timeout,
    ));
    let aggregator = Arc::new(AggregatorClient::new(
        aggregator_url.clone(),
        api_key,
        config.aggregator_timeout,
    )?);

    let quote = fetch_quote(aggregator_url.as_deref()).await?;
    println!(
        "Quote: {:.2} SOL -> {:.2} USDC ({} bps slippage, {} step{})",
        SWAP_AMOUNT as f64 / 1e9,
        quote.summary().out_amount as f64 / 1e6,
        quote.slippage_bps(),
        quote.summary().route_plan.len(),
        if quote.summary().route_plan.len() == 1 { "" } else { "s" }
    );

    let orchestrator = SwapOrchestrator::new(config, ledger.clone(), aggregator, payer)
        .with_sink(Arc::new(TracingSink));

    let request = SwapRequest {
        quote,
        wallet_address: user_pubkey.to_string(),
        fee_token_account: std::env::var("FEE_TOKEN_ACCOUNT").ok(),
        fee_amount: std::env::var("FEE_AMOUNT").ok(),
        priority_fee_lamports: None,
        mint_address: USDC_MINT.to_string(),
        is_copy_trade: false,
        slippage_mode: SlippageMode::Auto,
        slippage_bps: SLIPPAGE_BPS,
    };

    let swap = orchestrator.create_swap_transaction(&request).await?;
    println!(
        "Swap: {} bytes, {} CU limit, {} lamports priority fee, valid until block {}",
        STANDARD.decode(&swap.transaction_base64)?.len(),
        swap.compute_unit_limit,
        swap.prioritization_fee_lamports,
        swap.last_valid_block_height
    );
    let height = ledger.get_block_height().await?;
    println!(
        "Current block {}, {} blocks left to sign and send",
        height,
        swap.last_valid_block_height.saturating_sub(height)
    );

    if !send_tx {
        println!("\nSet SWAP_SEND_TX=true to sign with PRIVATE_KEY and send the transaction");
        return Ok(());
    }

    let private_key = std::env::var("PRIVATE_KEY")
        .expect("PRIVATE_KEY environment variable must be set (base58 encoded)");
    let keypair = Keypair::from_base58_string(&private_key);
    if keypair.pubkey() != user_pubkey {
        anyhow::bail!("USER_PUBKEY does not match the keypair derived from PRIVATE_KEY");
    }

    let unsigned: VersionedTransaction =
        bincode::deserialize(&STANDARD.decode(&swap.transaction_base64)?)?;
    let tx = VersionedTransaction::try_new(unsigned.message, &[&keypair])?;

    println!("\nSending transaction...");
    let rpc_client = RpcClient::new(rpc_url);
    let signature = rpc_client.send_transaction(&tx).await?;

    println!("\nTransaction sent: {}", signature);
    println!("Explorer: https://solscan.io/tx/{}", signature);

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn fetch_quote(base_url: Option<&str>) -> anyhow::Result<Quote> {
    let base_url = base_url.unwrap_or("https://lite-api.jup.ag/swap/v1");
    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("{}/quote", base_url.trim_end_matches('/')))
        .query(&[
            ("inputMint", SOL_MINT.to_string()),
            ("outputMint", USDC_MINT.to_string()),
            ("amount", SWAP_AMOUNT.to_string()),
            ("slippageBps", SLIPPAGE_BPS.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(Quote::try_from(body)?)
}
