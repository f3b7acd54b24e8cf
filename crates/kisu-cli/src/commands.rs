use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use colored::Colorize;
use serde_json::json;
use tracing::{debug, info};

use kisu_host::{HostBindings, InMemoryWorld, TickScheduler};
use kisu_market::{Listing, Market, ProductQuery};
use kisu_qidb::{ItemDatabaseConfig, QuickItemDatabase};
use kisu_types::{ItemList, Vector3};

use crate::cli::*;
use crate::config::{FileConfig, Overrides};

/// Upper bound on ticks spent draining a save queue before giving up.
const SETTLE_TICK_LIMIT: u64 = 1_000_000;

/// Height players are placed at by `init`.
const PLAYER_Y: f64 = 64.0;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = file.resolve(&Overrides {
        namespace: cli.namespace.clone(),
        cache_size: cli.cache_size,
        save_rate: cli.save_rate,
    });
    let format = cli.format;
    let world = cli.world.as_path();

    match cli.command {
        Command::Init(args) => cmd_init(world, config, format, args),
        Command::Set(args) => with_store(world, config, |_, db| cmd_set(db, format, args)),
        Command::Get(args) => with_store(world, config, |_, db| cmd_get(db, format, &args.key)),
        Command::Delete(args) => {
            with_store(world, config, |_, db| cmd_delete(db, format, &args.key))
        }
        Command::Keys => with_store(world, config, |_, db| cmd_keys(db, format)),
        Command::Clear => with_store(world, config, |_, db| cmd_clear(db, format)),
        Command::Tick(args) => with_store(world, config, |s, db| cmd_tick(s, db, format, args)),
        Command::Stats => with_store(world, config, |s, db| cmd_stats(s, db, format)),
        Command::List(args) => with_market(world, |market| cmd_list(market, format, args)),
        Command::Sell(args) => with_market(world, |market| cmd_sell(market, format, args)),
    }
}

/// A world loaded from its file together with a fresh scheduler.
pub struct Session {
    path: PathBuf,
    world: Arc<InMemoryWorld>,
    scheduler: Arc<TickScheduler>,
}

impl Session {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            bail!(
                "world file {} not found; create it with `kisu init`",
                path.display()
            );
        }
        let world = InMemoryWorld::load(path)
            .with_context(|| format!("loading world {}", path.display()))?;
        Ok(Self::with_world(path, world))
    }

    fn with_world(path: &Path, world: InMemoryWorld) -> Self {
        Self {
            path: path.to_path_buf(),
            world: Arc::new(world),
            scheduler: Arc::new(TickScheduler::new()),
        }
    }

    pub fn world(&self) -> &InMemoryWorld {
        &self.world
    }

    fn host(&self) -> HostBindings {
        HostBindings::in_memory(&self.world, &self.scheduler)
    }

    /// Open an item store and run its deferred start.
    pub fn store(&self, config: ItemDatabaseConfig) -> anyhow::Result<QuickItemDatabase> {
        let db = QuickItemDatabase::new(config, self.host())?;
        self.scheduler.tick();
        ensure_located(&db)?;
        Ok(db)
    }

    pub fn market(&self) -> anyhow::Result<Market> {
        let market = Market::open(&self.host())?;
        self.scheduler.tick();
        ensure_located(market.items())?;
        Ok(market)
    }

    /// Tick until `db` has written out everything it queued.
    pub fn settle(&self, db: &QuickItemDatabase) -> anyhow::Result<u64> {
        let ticks = self
            .scheduler
            .tick_until(SETTLE_TICK_LIMIT, || db.queued_len() == 0)
            .with_context(|| {
                format!(
                    "{} entries still queued after {SETTLE_TICK_LIMIT} ticks",
                    db.queued_len()
                )
            })?;
        debug!(namespace = db.namespace(), ticks, "save queue drained");
        Ok(ticks)
    }

    /// Shut the scheduler down and write the world back.
    pub fn close(self) -> anyhow::Result<()> {
        self.scheduler.shutdown();
        self.world
            .save(&self.path)
            .with_context(|| format!("saving world {}", self.path.display()))
    }
}

fn ensure_located(db: &QuickItemDatabase) -> anyhow::Result<()> {
    if db.location().is_none() {
        bail!("no storage location yet; place a player with `kisu init`");
    }
    Ok(())
}

fn with_store(
    path: &Path,
    config: ItemDatabaseConfig,
    f: impl FnOnce(&Session, &QuickItemDatabase) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let session = Session::open(path)?;
    let db = session.store(config)?;
    f(&session, &db)?;
    session.settle(&db)?;
    session.close()
}

fn with_market(path: &Path, f: impl FnOnce(&Market) -> anyhow::Result<()>) -> anyhow::Result<()> {
    let session = Session::open(path)?;
    let market = session.market()?;
    f(&market)?;
    session.settle(market.items())?;
    session.close()
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(
    path: &Path,
    config: ItemDatabaseConfig,
    format: OutputFormat,
    args: InitArgs,
) -> anyhow::Result<()> {
    if path.exists() && !args.force {
        bail!(
            "world file {} already exists; pass --force to replace it",
            path.display()
        );
    }
    let world = InMemoryWorld::new();
    world.add_player(args.player.as_str(), Vector3::new(args.x, PLAYER_Y, args.z));
    let session = Session::with_world(path, world);
    let db = session.store(config)?;
    let location = db.location();
    session.close()?;
    info!(path = %path.display(), "world created");

    match format {
        OutputFormat::Json => print_json(&json!({
            "world": path.display().to_string(),
            "player": args.player,
            "location": location,
        })),
        OutputFormat::Text => {
            println!(
                "{} Initialized world in {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            println!("  Player: {}", args.player.yellow());
            if let Some(location) = location {
                println!("  Storage: {}", location.to_string().cyan());
            }
            Ok(())
        }
    }
}

fn cmd_set(db: &QuickItemDatabase, format: OutputFormat, args: SetArgs) -> anyhow::Result<()> {
    let list: ItemList = args.slots.into_iter().map(|slot| slot.0).collect();
    let slots = list.len();
    db.set(&args.key, list)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "key": args.key, "slots": slots })),
        OutputFormat::Text => {
            println!(
                "{} Stored {} slots under {}",
                "✓".green().bold(),
                slots,
                args.key.yellow()
            );
            Ok(())
        }
    }
}

fn cmd_get(db: &QuickItemDatabase, format: OutputFormat, key: &str) -> anyhow::Result<()> {
    let value = db.get(key)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "key": key, "value": value })),
        OutputFormat::Text => {
            let Some(list) = value else {
                println!("{} not found", key.yellow());
                return Ok(());
            };
            println!("{} ({} slots)", key.yellow().bold(), list.len());
            for (i, slot) in list.slots().iter().enumerate() {
                match slot {
                    Some(stack) => println!("  {i:>4}  {stack}"),
                    None => println!("  {i:>4}  {}", "(empty)".dimmed()),
                }
            }
            Ok(())
        }
    }
}

fn cmd_delete(db: &QuickItemDatabase, format: OutputFormat, key: &str) -> anyhow::Result<()> {
    let existed = db.delete(key)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "key": key, "deleted": existed })),
        OutputFormat::Text => {
            if existed {
                println!("{} Deleted {}", "✓".green().bold(), key.yellow());
            } else {
                println!("{} not found", key.yellow());
            }
            Ok(())
        }
    }
}

fn cmd_keys(db: &QuickItemDatabase, format: OutputFormat) -> anyhow::Result<()> {
    let keys = db.keys()?;
    match format {
        OutputFormat::Json => print_json(&json!(keys)),
        OutputFormat::Text => {
            if keys.is_empty() {
                println!("No keys in {}.", db.namespace().cyan());
            }
            for key in keys {
                println!("{key}");
            }
            Ok(())
        }
    }
}

fn cmd_clear(db: &QuickItemDatabase, format: OutputFormat) -> anyhow::Result<()> {
    let cleared = db.clear()?;
    match format {
        OutputFormat::Json => print_json(&json!({ "cleared": cleared })),
        OutputFormat::Text => {
            println!(
                "{} Cleared {} entries from {}",
                "✓".green().bold(),
                cleared,
                db.namespace().cyan()
            );
            Ok(())
        }
    }
}

fn cmd_tick(
    session: &Session,
    db: &QuickItemDatabase,
    format: OutputFormat,
    args: TickArgs,
) -> anyhow::Result<()> {
    session.scheduler.run_ticks(args.ticks);
    let queued = db.queued_len();
    match format {
        OutputFormat::Json => print_json(&json!({ "ticks": args.ticks, "queued": queued })),
        OutputFormat::Text => {
            println!("Advanced {} ticks, {} entries queued", args.ticks, queued);
            Ok(())
        }
    }
}

fn cmd_stats(session: &Session, db: &QuickItemDatabase, format: OutputFormat) -> anyhow::Result<()> {
    let stats = session.world().stats();
    let keys = db.keys()?.len();
    match format {
        OutputFormat::Json => print_json(&json!({
            "world": stats,
            "store": {
                "namespace": db.namespace(),
                "keys": keys,
                "location": db.location(),
            },
        })),
        OutputFormat::Text => {
            println!("World");
            println!("  Properties:    {}", stats.properties);
            println!("  Structures:    {}", stats.structures);
            println!("  Live entities: {}", stats.live_entities);
            println!("  Spawned total: {}", stats.spawned_total);
            println!("  Players:       {}", stats.players);
            println!("Store {}", db.namespace().cyan().bold());
            println!("  Keys:          {keys}");
            if let Some(location) = db.location() {
                println!("  Location:      {location}");
            }
            Ok(())
        }
    }
}

fn cmd_list(market: &Market, format: OutputFormat, args: ListArgs) -> anyhow::Result<()> {
    let query = match (args.owner, args.item_type) {
        (Some(owner), _) => ProductQuery::Owner(owner),
        (None, Some(type_id)) => ProductQuery::TypeId(type_id),
        (None, None) => ProductQuery::All {
            include_hidden: args.hidden,
        },
    };
    let now = Utc::now();
    let listings = market.products(&query)?;

    match format {
        OutputFormat::Json => {
            let mut rows = Vec::with_capacity(listings.len());
            for listing in &listings {
                rows.push(json!({
                    "page": listing.page,
                    "code": listing.code,
                    "record": listing.data,
                    "item": market.item(listing)?,
                    "remaining": listing.data.remaining_time(now).map(|r| r.to_string()),
                }));
            }
            print_json(&json!(rows))
        }
        OutputFormat::Text => {
            if listings.is_empty() {
                println!("No listings.");
            }
            for listing in &listings {
                print_listing(market, listing, now)?;
            }
            Ok(())
        }
    }
}

fn print_listing(
    market: &Market,
    listing: &Listing,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<()> {
    let item = match market.item(listing)? {
        Some(stack) => stack.to_string(),
        None => "(missing item)".red().to_string(),
    };
    let remaining = match listing.data.remaining_time(now) {
        Some(left) => left.to_string().normal(),
        None => "expired".red(),
    };
    let hidden = if listing.data.hidden { " hidden" } else { "" };
    println!(
        "p{} {}  {}  {} by {}  {}{}",
        listing.page,
        listing.code.yellow().bold(),
        item,
        listing.data.price.to_string().green(),
        listing.data.owner.bold(),
        remaining,
        hidden.dimmed()
    );
    Ok(())
}

fn cmd_sell(market: &Market, format: OutputFormat, args: SellArgs) -> anyhow::Result<()> {
    let item = args.item.to_string();
    let listing = market.add_product(args.item, &args.owner, args.price, Utc::now())?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "page": listing.page,
            "code": listing.code,
            "record": listing.data,
        })),
        OutputFormat::Text => {
            println!(
                "{} Listed {} as {} on page {} for {}",
                "✓".green().bold(),
                item,
                listing.code.yellow().bold(),
                listing.page,
                listing.data.price.to_string().green()
            );
            Ok(())
        }
    }
}
