//! Capacity-bounded item store for Kisu.
//!
//! A [`QuickItemDatabase`] keeps lists of item stacks under
//! `namespace:identifier` keys. Values too large for a dynamic property are
//! spilled into structure snapshots: the store spawns short-lived carrier
//! entities whose 256-slot containers hold the list, captures them into a
//! structure named after the key, and removes them again.
//!
//! ```text
//! set ──► cache ──► save queue ──(save_rate per tick)──► carriers ──► snapshot
//!  │                                                                    │
//!  └──► marker property (carrier count)          get (cold) ◄───────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`] -- Store configuration, log switches and limits
//! - [`error`] -- Error types for store operations
//! - [`cache`] -- Insertion-ordered quick-access cache
//! - [`queue`] -- Deduplicated save queue
//! - [`carrier`] -- Carrier reconciliation and snapshot read/write
//! - [`location`] -- World-wide storage location
//! - [`database`] -- The [`QuickItemDatabase`] itself

pub mod cache;
pub mod carrier;
pub mod config;
pub mod database;
pub mod error;
pub mod location;
pub mod queue;

pub use cache::QuickCache;
pub use carrier::{required_carriers, CARRIER_CAPACITY, STORAGE_ENTITY};
pub use config::{
    validate_namespace, ItemDatabaseConfig, ItemDatabaseLogSettings, MAX_ENTRY_ITEMS,
    MAX_KEY_LENGTH,
};
pub use database::{QuickItemDatabase, PROGRESS_INTERVAL_TICKS};
pub use error::{QidbError, QidbResult};
pub use queue::{QueuedEntry, SaveQueue};
