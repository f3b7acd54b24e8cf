//! Namespaced record maps for Kisu.
//!
//! A [`DatabaseMap`] is an in-memory map of JSON-serializable records whose
//! every entry is mirrored into its own dynamic property. The property key
//! embeds the map id between two marker characters, so many maps share one
//! flat substrate without colliding:
//!
//! ```text
//! $DatabaseMap␞market:1␞x8k2p  ->  "{\"owner\":\"Alice\",\"price\":50}"
//! ```
//!
//! Maps are warm-loaded in full when opened; reads and iteration never touch
//! the substrate afterwards.
//!
//! # Modules
//!
//! - [`error`] -- Error types for map operations
//! - [`names`] -- Composite property key layout and parsing
//! - [`map`] -- The [`DatabaseMap`] itself, iterating in insertion order
//! - [`clear`] -- Cooperative clearing one key per scheduler step

pub mod clear;
pub mod error;
pub mod map;
pub mod names;
mod records;

pub use clear::{ClearHandle, ClearJob};
pub use error::{MapError, MapResult};
pub use map::DatabaseMap;
pub use names::{composite_key, map_ids, map_prefix, split_composite, MAP_MARKER, MAP_PREFIX};
