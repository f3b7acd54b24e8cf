use std::fmt;

use serde::{Deserialize, Serialize};

use kisu_types::{DynamicValue, ItemStack, Vector3};

use crate::error::HostResult;

/// Host-assigned identifier of a spawned entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle for work registered with a [`Scheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

/// The world's flat dynamic property substrate.
///
/// Writing `None` removes a key. Implementations must keep a key listed by
/// [`property_ids`](PropertyStore::property_ids) exactly as long as it holds
/// a value.
pub trait PropertyStore: Send + Sync {
    /// Read a property. Returns `Ok(None)` if it is not set.
    fn get_property(&self, key: &str) -> HostResult<Option<DynamicValue>>;

    /// Write a property, or remove it with `None`.
    fn set_property(&self, key: &str, value: Option<DynamicValue>) -> HostResult<()>;

    /// Every key currently holding a value.
    fn property_ids(&self) -> HostResult<Vec<String>>;

    /// Every key starting with `prefix`.
    fn property_ids_with_prefix(&self, prefix: &str) -> HostResult<Vec<String>> {
        Ok(self
            .property_ids()?
            .into_iter()
            .filter(|id| id.starts_with(prefix))
            .collect())
    }
}

/// Durable snapshots of live world state.
///
/// A structure captures the entities standing at a location, including their
/// container contents. Placing it recreates those entities. The storage layer
/// never looks inside a structure; it only round-trips through live entities.
pub trait StructureStore: Send + Sync {
    /// Whether a structure with this id exists.
    fn structure_exists(&self, id: &str) -> HostResult<bool>;

    /// Capture every entity at `location` into a new structure named `id`,
    /// replacing any structure of the same name.
    fn create_structure(&self, id: &str, location: Vector3) -> HostResult<()>;

    /// Recreate the entities of structure `id` at `location`.
    ///
    /// Returns `Ok(false)` if the structure does not exist.
    fn place_structure(&self, id: &str, location: Vector3) -> HostResult<bool>;

    /// Delete a structure. Returns `true` if it existed.
    fn delete_structure(&self, id: &str) -> HostResult<bool>;

    /// Ids of every saved structure.
    fn structure_ids(&self) -> HostResult<Vec<String>>;
}

/// Entity spawning and container access.
pub trait EntityHost: Send + Sync {
    /// Spawn an entity of `type_id` at `location`.
    fn spawn_entity(&self, type_id: &str, location: Vector3) -> HostResult<EntityId>;

    /// Entities of `type_id` standing at exactly `location`, oldest first.
    fn entities_at(&self, type_id: &str, location: Vector3) -> HostResult<Vec<EntityId>>;

    /// Remove an entity from the world.
    fn remove_entity(&self, id: EntityId) -> HostResult<()>;

    /// Number of slots in the entity's inventory.
    fn container_size(&self, id: EntityId) -> HostResult<usize>;

    /// Contents of one inventory slot.
    fn get_slot(&self, id: EntityId, slot: usize) -> HostResult<Option<ItemStack>>;

    /// Put an item into one inventory slot, or clear it with `None`.
    fn set_slot(&self, id: EntityId, slot: usize, item: Option<&ItemStack>) -> HostResult<()>;
}

/// The dimension storage entities live in.
pub trait Dimension: Send + Sync {
    /// Location of the first connected player, if any.
    fn player_location(&self) -> HostResult<Option<Vector3>>;

    /// Keep the column between `from` and `to` loaded while no player is near.
    fn add_ticking_area(&self, name: &str, from: Vector3, to: Vector3) -> HostResult<()>;
}

/// Outcome of one cooperative step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// Resumable unit of work driven by the scheduler one step at a time.
pub trait Stepper: Send {
    fn next(&mut self) -> Step;
}

/// Tick-driven scheduler for deferred work.
///
/// Everything runs on one logical thread: a task never overlaps another task
/// or the tick that registered it.
pub trait Scheduler: Send + Sync {
    /// Number of ticks elapsed.
    fn current_tick(&self) -> u64;

    /// Run `task` once, on the next tick.
    fn run_once(&self, task: Box<dyn FnOnce() + Send>) -> RunId;

    /// Run `task` every `interval` ticks, first after `interval` ticks.
    fn run_interval(&self, interval: u32, task: Box<dyn FnMut() + Send>) -> RunId;

    /// Advance `job` one step per tick until it reports [`Step::Done`].
    fn run_job(&self, job: Box<dyn Stepper>) -> RunId;

    /// Cancel registered work. Unknown ids are ignored.
    fn clear_run(&self, id: RunId);

    /// Run `hook` when the host shuts down.
    fn on_shutdown(&self, hook: Box<dyn FnOnce() + Send>);
}
