//! Host substrate interfaces for Kisu storage.
//!
//! The game host owns world persistence. Storage code only reaches it through
//! the narrow interfaces defined here, which keeps every store testable
//! against the in-memory implementations in this crate.
//!
//! # Substrates
//!
//! - [`PropertyStore`] -- flat string-keyed dynamic properties
//! - [`StructureStore`] -- snapshots of live entities captured at a location
//! - [`EntityHost`] -- spawning, listing and removing entities, and their
//!   container slots
//! - [`Dimension`] -- player positions and ticking areas
//! - [`Scheduler`] -- tick-driven deferred work and the shutdown hook
//!
//! # Implementations
//!
//! - [`InMemoryWorld`] -- one shared world state implementing every substrate
//!   except scheduling; serializable so it can be kept in a file
//! - [`TickScheduler`] -- a manually advanced cooperative scheduler

pub mod error;
pub mod memory;
pub mod scheduler;
pub mod traits;

use std::sync::Arc;

pub use error::{HostError, HostResult};
pub use memory::{InMemoryWorld, StructureSnapshot, WorldStats};
pub use scheduler::TickScheduler;
pub use traits::{
    Dimension, EntityHost, EntityId, PropertyStore, RunId, Scheduler, Step, Stepper,
    StructureStore,
};

/// The set of host interfaces a store is constructed with.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct HostBindings {
    pub properties: Arc<dyn PropertyStore>,
    pub structures: Arc<dyn StructureStore>,
    pub entities: Arc<dyn EntityHost>,
    pub dimension: Arc<dyn Dimension>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl HostBindings {
    /// Bind every substrate to one in-memory world and a manual scheduler.
    pub fn in_memory(world: &Arc<InMemoryWorld>, scheduler: &Arc<TickScheduler>) -> Self {
        Self {
            properties: world.clone(),
            structures: world.clone(),
            entities: world.clone(),
            dimension: world.clone(),
            scheduler: scheduler.clone(),
        }
    }
}

impl std::fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBindings")
            .field("tick", &self.scheduler.current_tick())
            .finish_non_exhaustive()
    }
}
