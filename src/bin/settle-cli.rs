use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use enlivora_settlement::blockchain::{StarknetClient, TokenId};
use enlivora_settlement::config::{load_or_default, validation::log_startup_warnings, SettlementConfig};
use enlivora_settlement::lifecycle::build_orchestrator;
use enlivora_settlement::observability::logging;
use enlivora_settlement::settlement::{
    LoyaltyRules, PassportMetadata, RedeemRequest, SettlementLedger, SettlementOrchestrator, WaitPolicy,
};

#[derive(Parser)]
#[command(name = "settle-cli")]
#[command(about = "Operator CLI for Enlivora Starknet settlement", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Return after submission instead of waiting for acceptance.
    #[arg(long, global = true)]
    no_wait: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a passport to the merchant account
    Mint {
        /// Product hash (0x-prefixed felt)
        #[arg(long)]
        product_hash: String,
        /// Token ID; random when omitted
        #[arg(long)]
        token_id: Option<String>,
    },
    /// Transfer a passport from the merchant to a customer
    Claim {
        token_id: String,
        #[arg(long)]
        to: String,
    },
    /// Credit loyalty points for an order
    Credit {
        #[arg(long)]
        user: String,
        /// Order reference used for deduplication
        #[arg(long)]
        order_ref: String,
        /// Order total in currency units; points follow the configured rate
        #[arg(long, conflicts_with = "points", required_unless_present = "points")]
        order_total: Option<String>,
        #[arg(long)]
        points: Option<u128>,
    },
    /// Redeem points for the reward token
    Redeem {
        #[arg(long)]
        user: String,
        #[arg(long)]
        points: u128,
        /// Reward token; defaults to the configured token
        #[arg(long)]
        reward_token: Option<String>,
        /// Reward amount in base units; defaults to the configured rate
        #[arg(long)]
        reward_amount: Option<u128>,
    },
    /// Show passport owner and revocation status
    Passport { token_id: String },
    /// Show a loyalty point balance
    Balance { user: String },
    /// Print the metadata document for a passport
    Metadata { token_id: String },
    /// List redeem intents from a running daemon's admin API
    Intents {
        #[arg(short, long, default_value = "http://127.0.0.1:8081")]
        url: String,
        /// Admin API key; defaults to admin.api_key from config
        #[arg(short, long)]
        key: Option<String>,
        /// Only intents that are not finished
        #[arg(long)]
        open: bool,
        /// Show a single intent
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;
    logging::init_logging(&config.observability);

    let wait = if cli.no_wait {
        WaitPolicy::Submitted
    } else {
        WaitPolicy::Confirmed
    };

    match cli.command {
        Commands::Metadata { token_id } => {
            let token: TokenId = token_id.parse()?;
            print_json(&PassportMetadata::for_token(token, &config.metadata))?;
        }
        Commands::Intents { url, key, open, id } => {
            let key = key.unwrap_or_else(|| config.admin.api_key.clone());
            let path = match id {
                Some(id) => format!("/admin/intents/{}", id),
                None if open => "/admin/intents?open=true".to_string(),
                None => "/admin/intents".to_string(),
            };
            admin_get(&url, &key, &path).await?;
        }
        Commands::Mint { product_hash, token_id } => {
            let orchestrator = connect(&config)?;
            let token_id = token_id.unwrap_or_else(|| fastrand::u64(1..=u64::from(u32::MAX)).to_string());
            let tx = orchestrator.mint(&token_id, &product_hash, wait).await?;
            print_json(&serde_json::json!({ "token_id": token_id, "tx_hash": tx }))?;
        }
        Commands::Claim { token_id, to } => {
            let orchestrator = connect(&config)?;
            let tx = orchestrator.transfer(&token_id, &to, wait).await?;
            print_json(&serde_json::json!({ "token_id": token_id, "tx_hash": tx }))?;
        }
        Commands::Credit {
            user,
            order_ref,
            order_total,
            points,
        } => {
            let orchestrator = connect(&config)?;
            let rules = LoyaltyRules::from_config(&config.rules);
            let points = match (points, order_total) {
                (Some(points), _) => points,
                (None, Some(total)) => rules.points_for_order_str(&total)?,
                (None, None) => return Err("either --points or --order-total is required".into()),
            };
            let tx = orchestrator.credit(&user, points, &order_ref, wait).await?;
            print_json(&serde_json::json!({ "points": points, "tx_hash": tx }))?;
        }
        Commands::Redeem {
            user,
            points,
            reward_token,
            reward_amount,
        } => {
            let orchestrator = connect(&config)?;
            let reward_amount = match reward_amount {
                Some(amount) => amount,
                None => LoyaltyRules::from_config(&config.rules).reward_amount_for_points(points)?,
            };
            let receipt = orchestrator
                .redeem(RedeemRequest {
                    user,
                    points,
                    reward_token: reward_token.unwrap_or_else(|| config.rules.default_reward_token.clone()),
                    reward_amount,
                    reward_wait: wait,
                })
                .await?;
            print_json(&receipt)?;
        }
        Commands::Passport { token_id } => match connect(&config)?.read_passport(&token_id).await {
            Some(status) => print_json(&status)?,
            None => {
                eprintln!("Passport {} not found or unreadable", token_id);
                std::process::exit(1);
            }
        },
        Commands::Balance { user } => {
            let balance = connect(&config)?.balance_of(&user).await?;
            print_json(&serde_json::json!({ "user": user, "points": balance.to_string() }))?;
        }
    }

    Ok(())
}

/// Orchestrator against the configured node, sharing the daemon's ledger file.
fn connect(config: &SettlementConfig) -> Result<SettlementOrchestrator<StarknetClient>, Box<dyn std::error::Error>> {
    log_startup_warnings(config);
    let ledger = Arc::new(SettlementLedger::open(&config.ledger)?);
    Ok(build_orchestrator(config, ledger)?)
}

async fn admin_get(url: &str, key: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = reqwest::Client::new()
        .get(format!("{}{}", url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    print_json(&json)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
