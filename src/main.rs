use clap::Parser;
use money_monitor::args::{Args, Command};
use money_monitor::{commands, Config, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with {} error: {e}", e.error_type());
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // Route to appropriate command handler. Every command except init needs an existing home.
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.bind()).await?.print(),

        Command::Serve(a) => commands::serve(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::Add(a) => commands::add(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::Update(a) => commands::update(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::Delete(a) => commands::delete(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::List(a) => commands::list(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::Totals(a) => commands::totals(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::Summary(a) => commands::summary(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::Trend(a) => commands::trend(Config::load(home).await?, a.clone())
            .await?
            .print(),

        Command::MerchantSpend(a) => {
            let config = Config::load(home).await?;
            commands::merchant_spend(config, a.clone()).await?.print()
        }

        Command::MerchantSave(a) => {
            let config = Config::load(home).await?;
            commands::merchant_save(config, a.clone()).await?.print()
        }

        Command::MerchantLookup(a) => {
            let config = Config::load(home).await?;
            commands::merchant_lookup(config, a.clone()).await?.print()
        }

        Command::Watch(a) => commands::watch(Config::load(home).await?, a.clone())
            .await?
            .print(),
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
