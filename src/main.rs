use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use console::style;

use chainfolio::config::AppConfig;
use chainfolio::log::init_logging;
use chainfolio::model::Asset;
use chainfolio::{Aggregator, SortOrder};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display aggregated asset balances across all origins
    Assets {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Display aggregated activity history across all origins
    Activities {
        /// Sort oldest first
        #[arg(long)]
        ascending: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(command) => run(command, cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

async fn run(command: Commands, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    let accounts = config.accounts.clone();
    let currency = config.currency.clone();
    let aggregator = Aggregator::new(config);

    match command {
        Commands::Assets { json } => {
            let assets = aggregator.asset_list(&accounts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&assets)?);
            } else {
                println!("{}", assets_table(&assets, &currency));
            }
        }
        Commands::Activities { ascending } => {
            let order = if ascending {
                SortOrder::Ascending
            } else {
                SortOrder::Descending
            };
            let activities = aggregator.activities(&accounts, order).await?;
            println!("{}", serde_json::to_string_pretty(&activities)?);
        }
        Commands::Setup => unreachable!("Setup command is handled separately"),
    }
    Ok(())
}

fn assets_table(assets: &[Asset], currency: &str) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new(style("Origin").bold().to_string()),
        Cell::new(style("Symbol").bold().to_string()),
        Cell::new(style("Name").bold().to_string()),
        Cell::new(style("Balance").bold().to_string()),
        Cell::new(style(format!("Value ({currency})")).bold().to_string()),
    ]);

    let mut total = rust_decimal::Decimal::ZERO;
    for asset in assets {
        total += asset.value;
        table.add_row(vec![
            Cell::new(&asset.origin_name),
            Cell::new(&asset.symbol),
            Cell::new(&asset.name),
            Cell::new(asset.balance.to_string()),
            Cell::new(asset.value.to_string()),
        ]);
    }

    format!(
        "{table}\n\nTotal Value ({}): {}",
        currency,
        style(total.to_string()).green().bold()
    )
}

fn setup() -> Result<()> {
    use anyhow::Context;

    let path = AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
currency: "USD"
fail_fast: false

accounts:
  exchanges: []
  wallets: []
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
