//! Probability perpetuals simulator.
//!
//! Runs the market ticker against a persisted wallet, or applies one trading
//! action and exits. State lives in `--state-dir` between invocations.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prob_perps::*;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "prob-perps")]
#[command(about = "Leveraged long/short positions on prediction market probabilities")]
#[command(version)]
struct Cli {
    /// Directory holding the persisted wallet
    #[arg(long, global = true, default_value = ".prob-perps")]
    state_dir: PathBuf,

    /// TOML config file; fields not set fall back to the preset
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = PresetArg::Demo)]
    preset: PresetArg,

    /// Seed for the price walk. Random when omitted.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    /// pretty or json
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tick markets until ctrl-c or the tick budget runs out
    Run {
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// List markets and their current probability
    Markets,
    /// Show balance and open positions
    Status,
    /// Open a position at the market's current probability
    Open {
        market: String,
        amount: String,
        direction: Direction,
        #[arg(long, default_value_t = 1)]
        leverage: u32,
    },
    /// Close a position by id
    Close { position_id: String },
    /// Add the recharge amount to the balance
    Recharge,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    Demo,
    Calm,
    Volatile,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Demo => Preset::Demo,
            PresetArg::Calm => Preset::Calm,
            PresetArg::Volatile => Preset::Volatile,
        }
    }
}

fn load_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Preset::from(cli.preset).config(),
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    config.validate().context("invalid config")?;
    Ok(config)
}

fn build_engine(cli: &Cli, config: SimConfig) -> Result<Arc<Engine>> {
    let store = FileStore::open(&cli.state_dir)
        .with_context(|| format!("opening state dir {}", cli.state_dir.display()))?;

    let rng: Box<dyn RandomSource> = match cli.seed {
        Some(seed) => Box::new(SeededRandom::from_seed(seed)),
        None => Box::new(SeededRandom::from_entropy()),
    };

    let engine = Engine::open(config, Arc::new(store), rng, Arc::new(LogNotifier))
        .context("loading ledger")?;
    Ok(Arc::new(engine))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.logging.init();

    let engine = build_engine(&cli, config)?;

    match &cli.command {
        Commands::Run { ticks } => run(engine, *ticks).await?,
        Commands::Markets => print_markets(&engine),
        Commands::Status => print_status(&engine),
        Commands::Open {
            market,
            amount,
            direction,
            leverage,
        } => {
            let position = engine.open_trade(&MarketId::new(market.as_str()), amount, *leverage, *direction)?;
            println!(
                "Opened {} {} {} on {} at {} (margin {})",
                position.id,
                position.direction,
                position.leverage,
                position.market_title,
                position.entry_prob,
                position.amount
            );
        }
        Commands::Close { position_id } => {
            let Some(closed) = engine.close_trade(&PositionId(position_id.clone()))? else {
                bail!("position {position_id} is not open");
            };
            println!(
                "Closed {} at {}: pnl {}, balance {}",
                closed.position.id,
                closed.exit_prob,
                closed.realized_pnl.value().round_dp(2),
                closed.new_balance.value().round_dp(2)
            );
        }
        Commands::Recharge => {
            let balance = engine.recharge()?;
            println!("Balance: {}", balance.value().round_dp(2));
        }
    }

    Ok(())
}

async fn run(engine: Arc<Engine>, ticks: Option<u64>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-c received");
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Ticker running, ctrl-c to stop");
    let period = engine.config().tick_interval();
    let count = run_ticker(Arc::clone(&engine), period, ticks, shutdown_rx).await?;

    info!(ticks = count, "Stopped");
    print_status(&engine);
    Ok(())
}

fn print_markets(engine: &Engine) {
    for market in engine.markets().iter() {
        println!(
            "{:<24} {:>6} {:>7}  {} [{}]",
            market.id,
            market.current_probability.to_string(),
            signed(market.change().round_dp(2)),
            market.title,
            market.category
        );
    }
}

fn print_status(engine: &Engine) {
    let view = engine.view();
    println!("Balance: {}", view.ledger.balance.value().round_dp(2));
    println!("Equity:  {}", view.ledger.equity().value().round_dp(2));

    let rows = view.position_rows(engine.config());
    if rows.is_empty() {
        println!("No open positions");
        return;
    }
    for row in rows {
        let p = &row.position;
        println!(
            "{}  {} {} {}  entry {} now {}  pnl {} ({}%){}",
            p.id,
            p.direction,
            p.leverage,
            p.market_title,
            p.entry_prob,
            p.current_prob,
            row.metrics.pnl.value().round_dp(2),
            row.metrics.leveraged_pnl_percent.round_dp(1),
            if row.metrics.near_liquidation { "  NEAR LIQUIDATION" } else { "" }
        );
    }
}

fn signed(value: Decimal) -> String {
    if value.is_sign_positive() && !value.is_zero() {
        format!("+{value}")
    } else {
        value.to_string()
    }
}
