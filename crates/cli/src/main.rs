//! Farm Market CLI - buyer basket, checkout and order history.
//!
//! # Usage
//!
//! ```bash
//! # Show the basket
//! fm-cli basket show
//!
//! # Add one unit to line 12, then save the change
//! fm-cli basket inc 12
//!
//! # Set line 12 to 4 units (0 removes the line)
//! fm-cli basket set 12 4
//!
//! # Add product 7 to the basket
//! fm-cli basket add 7
//!
//! # Place an order from the basket
//! fm-cli checkout
//!
//! # Vegetables from farms matching "acres"
//! fm-cli products --search acres --category Vegetables
//! ```
//!
//! # Commands
//!
//! - `basket` - Show and edit the basket
//! - `checkout` - Save pending changes and place an order
//! - `orders` - List past orders
//! - `products` - List catalog products, optionally filtered
//! - `categories` - List product categories
//!
//! Configuration is read from the environment (see `ClientConfig::from_env`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use farm_market_client::{ApiClient, CartSyncController, ClientConfig};
use farm_market_core::{LineId, ProductFilter, ProductId};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::basket::{Edit, edit as basket_edit};

const DEFAULT_LOG_FILTER: &str = "farm_market_client=info,farm_market_cli=info";

#[derive(Parser)]
#[command(name = "fm-cli")]
#[command(author, version, about = "Farm Market buyer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and edit the basket
    Basket {
        #[command(subcommand)]
        action: BasketAction,
    },
    /// Save pending changes and place an order
    Checkout,
    /// List past orders
    Orders,
    /// List catalog products
    Products {
        /// Only products whose name or farm contains this text
        #[arg(long)]
        search: Option<String>,

        /// Only products in this category ("All" for every category)
        #[arg(long)]
        category: Option<String>,
    },
    /// List product categories
    Categories,
}

#[derive(Subcommand)]
enum BasketAction {
    /// Show the basket
    Show,
    /// Add one unit to a line
    Inc {
        /// Basket line ID
        line: LineId,
    },
    /// Remove one unit from a line (stops at 1)
    Dec {
        /// Basket line ID
        line: LineId,
    },
    /// Delete a line
    Remove {
        /// Basket line ID
        line: LineId,
    },
    /// Set a line's quantity (0 deletes the line)
    Set {
        /// Basket line ID
        line: LineId,

        /// Desired quantity
        quantity: u32,
    },
    /// Add one unit of a product as a new line
    Add {
        /// Product ID
        product: ProductId,
    },
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let client = ApiClient::new(&config)?;
    client.ensure_session().await?;

    match cli.command {
        Commands::Basket { action } => {
            let cart = CartSyncController::new(client);
            match action {
                BasketAction::Show => commands::basket::show(&cart).await?,
                BasketAction::Add { product } => commands::basket::add(&cart, product).await?,
                BasketAction::Inc { line } => basket_edit(&cart, Edit::Increment(line)).await?,
                BasketAction::Dec { line } => basket_edit(&cart, Edit::Decrement(line)).await?,
                BasketAction::Remove { line } => basket_edit(&cart, Edit::Remove(line)).await?,
                BasketAction::Set { line, quantity } => {
                    basket_edit(&cart, Edit::Set(line, quantity)).await?;
                }
            }
        }
        Commands::Checkout => {
            let cart = CartSyncController::new(client);
            commands::basket::checkout(&cart).await?;
        }
        Commands::Orders => commands::catalog::orders(&client).await?,
        Commands::Products { search, category } => {
            let mut filter = ProductFilter::new();
            if let Some(text) = search.as_deref() {
                filter = filter.search(text);
            }
            if let Some(name) = category.as_deref() {
                filter = filter.category(name);
            }
            commands::catalog::products(&client, &filter).await?;
        }
        Commands::Categories => commands::catalog::categories(&client).await?,
    }
    Ok(())
}
