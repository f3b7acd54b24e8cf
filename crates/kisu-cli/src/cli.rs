use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use kisu_types::ItemStack;

#[derive(Parser)]
#[command(name = "kisu", version, about = "Kisu storage over a world file")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// World state file, created on `init`.
    #[arg(short, long, global = true, default_value = "world.json")]
    pub world: PathBuf,
    /// Optional TOML file with a `[database]` table.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Item store namespace; overrides the config file.
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,
    #[arg(long, global = true)]
    pub cache_size: Option<usize>,
    #[arg(long, global = true)]
    pub save_rate: Option<usize>,
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the world file and place a player
    Init(InitArgs),
    /// Store a list of item stacks under a key
    Set(SetArgs),
    /// Read the items stored under a key
    Get(KeyArgs),
    /// Delete a key
    Delete(KeyArgs),
    /// List stored keys
    Keys,
    /// Delete every key in the namespace
    Clear,
    /// Advance the world clock
    Tick(TickArgs),
    /// Show market listings
    List(ListArgs),
    /// Put an item up for sale
    Sell(SellArgs),
    /// Show world and store counters
    Stats,
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long, default_value = "Steve")]
    pub player: String,
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub x: f64,
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub z: f64,
    /// Overwrite an existing world file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    /// Slots as `type[*amount]`, or `-` for an empty slot.
    #[arg(required = true, value_parser = parse_slot)]
    pub slots: Vec<SlotSpec>,
}

#[derive(Args)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Args)]
pub struct TickArgs {
    #[arg(default_value = "1")]
    pub ticks: u64,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long, conflicts_with = "item_type")]
    pub owner: Option<String>,
    #[arg(long = "type")]
    pub item_type: Option<String>,
    /// Include hidden listings.
    #[arg(long)]
    pub hidden: bool,
}

#[derive(Args)]
pub struct SellArgs {
    #[arg(value_parser = parse_stack)]
    pub item: ItemStack,
    #[arg(long)]
    pub owner: String,
    #[arg(long)]
    pub price: i64,
}

/// One container slot given on the command line.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotSpec(pub Option<ItemStack>);

/// Parse `type[*amount]`.
pub fn parse_stack(spec: &str) -> Result<ItemStack, String> {
    let (type_id, amount) = match spec.split_once('*') {
        Some((type_id, amount)) => {
            let amount = amount
                .parse::<u8>()
                .map_err(|e| format!("bad amount {amount:?}: {e}"))?;
            (type_id, amount)
        }
        None => (spec, 1),
    };
    ItemStack::new(type_id, amount).map_err(|e| e.to_string())
}

pub fn parse_slot(spec: &str) -> Result<SlotSpec, String> {
    if spec == "-" {
        return Ok(SlotSpec(None));
    }
    parse_stack(spec).map(|stack| SlotSpec(Some(stack)))
}
