use bitcoin::Amount;
use clap::Parser;
use coincontrol::{
    coins::CoinSnapshot,
    config::CoinControlConfig,
    error::CoinControlError,
    selection::LockFile,
    session::CoinControlSession,
    utill::{get_data_dir, parse_outpoint, setup_logger},
    view::{SortColumn, SortState},
};
use log::LevelFilter;
use serde_json::{json, to_string_pretty};
use std::{path::PathBuf, str::FromStr};

/// A command line front end to manual coin selection.
///
/// Reads a wallet coin snapshot (JSON), applies a selection and a payment request, and
/// prints the resulting fee, change, size and priority estimate. Locks are kept in a
/// lock list inside the data directory and survive between runs.
#[derive(Parser, Debug)]
#[clap(version = option_env ! ("CARGO_PKG_VERSION").unwrap_or("unknown"),
author = option_env ! ("CARGO_PKG_AUTHORS").unwrap_or(""))]
struct Cli {
    /// Optional data directory. Default value: "~/.coincontrol"
    #[clap(long, short = 'd')]
    data_directory: Option<PathBuf>,

    /// Optional config file. Default value: "<data-directory>/config.toml"
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Coin snapshot: candidate outputs grouped by address plus the wallet's public keys.
    #[clap(long, short = 's')]
    snapshot: Option<PathBuf>,

    /// Sets the verbosity level of debug.log file
    #[clap(long, short = 'v', possible_values = &["off", "error", "warn", "info", "debug", "trace"], default_value = "info")]
    pub verbosity: String,

    /// List of commands
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Estimate fee, change, size and priority for a selection.
    Estimate {
        /// Outpoints to select, as txid:vout. Repeatable.
        #[clap(long = "select", short = 'i')]
        select: Vec<String>,
        /// Select every unlocked, unspent output.
        #[clap(long)]
        all: bool,
        /// Payment amounts in sats. Repeatable.
        #[clap(long = "pay", short = 'p')]
        pay: Vec<u64>,
    },
    /// Show every output with its priority, grouped by address.
    View {
        /// Outpoints to mark as selected, as txid:vout. Repeatable.
        #[clap(long = "select", short = 'i')]
        select: Vec<String>,
        /// Sort column: amount, address, date, confirmations or priority.
        #[clap(long, default_value = "amount")]
        sort: SortColumn,
        /// Reverse the column's default order.
        #[clap(long)]
        reverse: bool,
    },
    /// Lock an output against spending.
    Lock {
        /// Outpoint as txid:vout.
        outpoint: String,
    },
    /// Unlock a previously locked output.
    Unlock {
        /// Outpoint as txid:vout.
        outpoint: String,
    },
    /// List locked outputs.
    ListLocked,
}

fn main() -> Result<(), CoinControlError> {
    let args = Cli::parse();
    let data_dir = args.data_directory.clone().unwrap_or_else(get_data_dir);
    setup_logger(
        LevelFilter::from_str(&args.verbosity).unwrap_or(LevelFilter::Info),
        Some(data_dir.clone()),
    );

    let default_config_path = data_dir.join("config.toml");
    let config = CoinControlConfig::new(Some(
        args.config.as_deref().unwrap_or(&default_config_path),
    ))?;

    match &args.command {
        Commands::Estimate { select, all, pay } => {
            let mut session = open_session(&args, &config, &data_dir)?;
            if *all {
                session.toggle_all();
            }
            for outpoint in select {
                session.select(parse_outpoint(outpoint)?);
            }
            let result =
                session.set_payment_amounts(pay.iter().map(|s| Amount::from_sat(*s)).collect());

            let report = json!({
                "estimate": result,
                "low_output_status": result.low_output_status(),
                "locked": session.store().locked_count(),
            });
            println!("{}", to_string_pretty(&report)?);
        }
        Commands::View {
            select,
            sort,
            reverse,
        } => {
            let mut session = open_session(&args, &config, &data_dir)?;
            for outpoint in select {
                session.select(parse_outpoint(outpoint)?);
            }
            let mut groups = session.view();

            let mut state = SortState::default();
            state.click(*sort);
            if *reverse {
                state.click(*sort);
            }
            state.sort_groups(&mut groups);

            println!("{}", to_string_pretty(&groups)?);
        }
        Commands::Lock { outpoint } => {
            let lock_file = LockFile::from_config(&data_dir, &config.lock_file);
            let outpoint = parse_outpoint(outpoint)?;
            let mut locked = lock_file.read()?;
            if locked.insert(outpoint) {
                lock_file.write(&locked)?;
                log::info!("Locked {outpoint} in {}", lock_file.path().display());
            } else {
                log::warn!("{outpoint} is already locked");
            }
        }
        Commands::Unlock { outpoint } => {
            let lock_file = LockFile::from_config(&data_dir, &config.lock_file);
            let outpoint = parse_outpoint(outpoint)?;
            let mut locked = lock_file.read()?;
            if locked.remove(&outpoint) {
                lock_file.write(&locked)?;
                log::info!("Unlocked {outpoint} in {}", lock_file.path().display());
            } else {
                log::warn!("{outpoint} was not locked");
            }
        }
        Commands::ListLocked => {
            let lock_file = LockFile::from_config(&data_dir, &config.lock_file);
            let locked: Vec<String> = lock_file.read()?.iter().map(|o| o.to_string()).collect();
            println!("{}", to_string_pretty(&locked)?);
        }
    }

    Ok(())
}

fn open_session(
    args: &Cli,
    config: &CoinControlConfig,
    data_dir: &std::path::Path,
) -> Result<CoinControlSession, CoinControlError> {
    let snapshot_path = args.snapshot.as_ref().ok_or_else(|| {
        CoinControlError::General("A coin snapshot is required, pass --snapshot".to_string())
    })?;
    let snapshot = CoinSnapshot::load(snapshot_path)?;
    CoinControlSession::open(config, data_dir, snapshot)
}

