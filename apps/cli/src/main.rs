//! EquityCraft CLI
//!
//! Operator and holder commands for reward pools, run against a simulated
//! ledger kept in a local state file.

mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use equitycraft_core::{plan_for_holding, Amount, OutRef, PolicyId, PoolIndex, TokenIndex};
use equitycraft_logging::LogLevel;
use equitycraft_settlement::{
    advance, create_pool, issue_equity, reconcile, AnchorInputs, ExecuteOptions, LedgerService,
    MemoryPoolRegistry, PoolRequest, SettlementOutcome, WithdrawalError, WithdrawalOrchestrator,
    DEFAULT_CONFIRMATION_TIMEOUT, INITIAL_EQUITY_SUPPLY,
};
use equitycraft_store::{
    default_config_path, default_state_path, expand_path, ConfigStore, JsonConfigStore,
};

use crate::state::Simulation;

/// EquityCraft - index-ratchet reward pools
#[derive(Parser)]
#[command(name = "equitycraft")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pool config file
    #[arg(long, env = "EQUITYCRAFT_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated ledger state file
    #[arg(long, env = "EQUITYCRAFT_STATE")]
    state: Option<PathBuf>,

    /// Equity policy id (56 hex characters)
    #[arg(long, env = "EQUITYCRAFT_POLICY")]
    policy: PolicyId,

    /// Wallet name of the acting holder
    #[arg(long, default_value = "default")]
    holder: String,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the holder's equity by token index
    Holdings,

    /// List configured pools with live balances and qualifying tokens
    Pools,

    /// Show the settlements a withdrawal would need
    Plan {
        /// Target pool index
        #[arg(long)]
        pool: PoolIndex,

        #[arg(long)]
        amount: Amount,

        /// Spend this token index instead of the highest qualifying one
        #[arg(long)]
        from: Option<TokenIndex>,
    },

    /// Withdraw from a pool, settling every intermediate pool first
    Withdraw {
        #[arg(long)]
        pool: PoolIndex,

        #[arg(long)]
        amount: Amount,

        #[arg(long)]
        from: Option<TokenIndex>,

        /// Seconds to wait for each settlement to confirm
        #[arg(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT.as_secs())]
        timeout: u64,
    },

    /// Create, record and fund a new reward pool
    CreatePool {
        #[arg(long)]
        index: PoolIndex,

        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        /// Funding amount
        #[arg(long)]
        amount: Amount,

        /// One-shot output consumed to make the pool unique (txHash#index)
        #[arg(long)]
        seed: OutRef,

        /// Equity reference script (defaults to the one recorded at issuance)
        #[arg(long)]
        equity_script: Option<OutRef>,
    },

    /// Mint fresh equity at index 0 to the holder
    Issue {
        #[arg(long, default_value_t = INITIAL_EQUITY_SUPPLY)]
        amount: Amount,
    },

    /// Move equity one index forward without a pool
    Advance {
        #[arg(long)]
        from: TokenIndex,

        #[arg(long)]
        amount: Amount,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    equitycraft_logging::init(LogLevel::from_verbosity(cli.verbose));

    let config_path = expand_path(&cli.config.clone().unwrap_or_else(default_config_path));
    let state_path = expand_path(&cli.state.clone().unwrap_or_else(default_state_path));
    let store = JsonConfigStore::new(config_path);
    let sim = Simulation::open(state_path, &cli.holder)?;
    let policy = cli.policy;

    match cli.command {
        Commands::Holdings => {
            holdings(&sim, &policy).await?;
        }
        Commands::Pools => {
            pools(&sim, &store, &policy).await?;
        }
        Commands::Plan { pool, amount, from } => {
            show_plan(&sim, &store, &policy, pool, amount, from).await?;
        }
        Commands::Withdraw {
            pool,
            amount,
            from,
            timeout,
        } => {
            let result = withdraw(&sim, &store, &policy, pool, amount, from, timeout).await;
            sim.commit()?;
            result?;
        }
        Commands::CreatePool {
            index,
            name,
            description,
            amount,
            seed,
            equity_script,
        } => {
            let request = PoolRequest {
                index,
                name,
                description,
                total_amount: amount,
                anchor_inputs: AnchorInputs {
                    equity_script: match equity_script {
                        Some(script) => script,
                        None => sim.state.equity_script(&policy).with_context(|| {
                            format!("no equity script recorded for {policy}; run `issue` first or pass --equity-script")
                        })?,
                    },
                    seed,
                },
            };
            register_pool(&sim, &store, &policy, request).await?;
            sim.commit()?;
        }
        Commands::Issue { amount } => {
            let mut sim = sim;
            let script = sim.state.ensure_equity_script(&policy);
            let tx = issue_equity(&sim.ledger, &policy, amount).await?;
            println!("Issued {} equity at index 0 (tx {})", amount, hex::encode(tx));
            println!("Equity script: {}", script);
            sim.commit()?;
        }
        Commands::Advance { from, amount } => {
            let tx = advance(&sim.ledger, &policy, from, amount).await?;
            println!("Advanced {} from index {} to {} (tx {})", amount, from, from + 1, hex::encode(tx));
            sim.commit()?;
        }
    }

    Ok(())
}

async fn holdings(sim: &Simulation, policy: &PolicyId) -> Result<()> {
    let holding = sim.ledger.get_holdings(policy).await?;
    if holding.is_empty() {
        println!("No equity held under {}", policy);
        return Ok(());
    }

    println!("Equity Holdings");
    println!("===============");
    println!("{:<8} {:>20}", "INDEX", "AMOUNT");
    for (index, amount) in holding.iter() {
        println!("{:<8} {:>20}", index, amount);
    }
    println!("\nTotal: {}", holding.total());
    Ok(())
}

async fn pools(sim: &Simulation, store: &JsonConfigStore, policy: &PolicyId) -> Result<()> {
    let configured = store.load(policy).context("loading pool config")?;
    if configured.is_empty() {
        println!("No pools configured for {}", policy);
        return Ok(());
    }
    let holding = sim.ledger.get_holdings(policy).await?;

    println!("Reward Pools");
    println!("============");
    println!(
        "{:<6} {:<24} {:<10} {:>14} {:>14}  {}",
        "INDEX", "NAME", "STATUS", "FUNDED", "REMAINING", "QUALIFYING"
    );
    println!("{}", "-".repeat(90));
    for view in equitycraft_core::project(&configured, &holding) {
        let remaining = match sim.ledger.get_pool(policy, view.pool.index).await {
            Ok(live) => live.total_amount.to_string(),
            Err(_) => "-".to_string(),
        };
        let qualifying = view
            .qualifying
            .iter()
            .map(|(index, amount)| format!("{amount}@{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<6} {:<24} {:<10} {:>14} {:>14}  {}",
            view.pool.index,
            view.pool.name,
            view.pool.status.as_str(),
            view.pool.total_amount,
            remaining,
            qualifying
        );
    }
    Ok(())
}

async fn show_plan(
    sim: &Simulation,
    store: &JsonConfigStore,
    policy: &PolicyId,
    pool: PoolIndex,
    amount: Amount,
    from: Option<TokenIndex>,
) -> Result<()> {
    let plan = build_plan(sim, store, policy, pool, amount, from).await?;

    println!(
        "Withdraw {} from pool {} using tokens at index {}",
        plan.amount, plan.target_pool_index, plan.source_index
    );
    for (i, step) in plan.settlement_steps().iter().enumerate() {
        let role = if step.is_pass_through() { "pass-through" } else { "withdraw" };
        println!(
            "  {}. pool {:<4} burn {}@{} -> mint {}@{}  debit {:<10} ({})",
            i + 1,
            step.pool.index,
            step.amount,
            step.burn_index,
            step.amount,
            step.mint_index,
            step.balance_delta,
            role
        );
    }
    println!("Tokens end at index {}", plan.final_index());
    Ok(())
}

async fn build_plan(
    sim: &Simulation,
    store: &JsonConfigStore,
    policy: &PolicyId,
    pool: PoolIndex,
    amount: Amount,
    from: Option<TokenIndex>,
) -> Result<equitycraft_core::CascadePlan> {
    let registry = store.snapshot().context("loading pool config")?;
    let target = registry
        .pool(policy, pool)
        .with_context(|| format!("pool {pool} is not configured for {policy}"))?;
    let holding = sim.ledger.get_holdings(policy).await?;
    let plan = plan_for_holding(&holding, target, registry.pools(policy), amount, from)?;
    Ok(plan)
}

async fn withdraw(
    sim: &Simulation,
    store: &JsonConfigStore,
    policy: &PolicyId,
    pool: PoolIndex,
    amount: Amount,
    from: Option<TokenIndex>,
    timeout: u64,
) -> Result<()> {
    let plan = build_plan(sim, store, policy, pool, amount, from).await?;
    let ledger: Arc<dyn LedgerService> = Arc::new(sim.ledger.clone());
    let orchestrator = WithdrawalOrchestrator::new(Arc::clone(&ledger), *policy);

    let options = ExecuteOptions::with_timeout(Duration::from_secs(timeout));
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the in-flight settlement");
            cancel.cancel();
        }
    });

    match orchestrator.execute(&plan, &options).await {
        Ok(receipt) => {
            for change in &receipt.status_changes {
                store
                    .set_status(policy, change.pool_index, change.to)
                    .with_context(|| format!("recording status of pool {}", change.pool_index))?;
            }
            println!(
                "Withdrew {} from pool {} in {} settlement(s)",
                plan.amount,
                plan.target_pool_index,
                receipt.settlements.len()
            );
            for record in &receipt.settlements {
                println!("  pool {:<4} tx {}", record.pool_index, hex::encode(record.tx));
            }
            println!("Remaining tokens now at index {}", receipt.final_index);
            Ok(())
        }
        Err(WithdrawalError::TimedOut {
            pool_index, probe, ..
        }) => {
            warn!("Settlement on pool {} unconfirmed, checking holdings", pool_index);
            let outcome = reconcile(&probe, ledger.as_ref()).await?;
            match outcome {
                SettlementOutcome::Committed { current_index } => {
                    info!("Settlement on pool {} did commit", pool_index);
                    println!("Settlement on pool {pool_index} committed late; tokens at index {current_index}");
                }
                SettlementOutcome::NotCommitted { current_index } => {
                    println!("Settlement on pool {pool_index} did not commit; tokens at index {current_index}");
                }
            }
            if plan.resume_from(outcome.current_index()).is_some() {
                println!("Re-run `withdraw` to continue from index {}", outcome.current_index());
            }
            bail!("withdrawal interrupted by a settlement timeout")
        }
        Err(e) => {
            if let Some(index) = e.current_index() {
                println!("Tokens are at index {index}; completed settlements are kept");
            }
            Err(e.into())
        }
    }
}

async fn register_pool(
    sim: &Simulation,
    store: &JsonConfigStore,
    policy: &PolicyId,
    request: PoolRequest,
) -> Result<()> {
    let existing = store.load(policy).context("loading pool config")?;
    let registry = sim.state.registry();
    let pool = create_pool(request, &existing, &registry).await?;

    // Fund first so the config never lists a pool the ledger lacks
    sim.ledger
        .add_pool(*policy, pool.clone())
        .context("funding pool on the ledger")?;
    store
        .append(policy, pool.clone())
        .context("recording pool")?;

    println!("Created pool {} '{}' funded with {}", pool.index, pool.name, pool.total_amount);
    println!("Anchor: {}", pool.anchor);
    println!("Pool unit: {}", MemoryPoolRegistry::pool_unit(&pool.anchor, pool.index).encode());
    Ok(())
}
