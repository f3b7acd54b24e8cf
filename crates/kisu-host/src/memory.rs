//! In-memory world implementing every storage substrate.
//!
//! [`InMemoryWorld`] keeps dynamic properties, structures, entities, players
//! and ticking areas in one state behind a `RwLock`, so a structure captured
//! from live entities sees exactly what the entity host wrote. The state is
//! serializable; the CLI keeps it in a JSON file between runs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kisu_types::{DynamicValue, ItemStack, Vector3};

use crate::error::{HostError, HostResult};
use crate::traits::{Dimension, EntityHost, EntityId, PropertyStore, StructureStore};

/// Inventory size given to spawned entities unless configured otherwise.
pub const DEFAULT_CONTAINER_SLOTS: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Entity {
    type_id: String,
    location: Vector3,
    slots: Vec<Option<ItemStack>>,
}

/// One entity as captured in a structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedEntity {
    pub type_id: String,
    pub slots: Vec<Option<ItemStack>>,
}

/// Entities captured from a single location.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub entities: Vec<CapturedEntity>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Player {
    name: String,
    location: Vector3,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WorldState {
    container_slots: usize,
    #[serde(default)]
    properties: BTreeMap<String, DynamicValue>,
    #[serde(default)]
    structures: BTreeMap<String, StructureSnapshot>,
    #[serde(default)]
    entities: BTreeMap<EntityId, Entity>,
    #[serde(default)]
    next_entity_id: u64,
    #[serde(default)]
    players: Vec<Player>,
    #[serde(default)]
    ticking_areas: BTreeMap<String, (Vector3, Vector3)>,
    /// Entities spawned over the world's lifetime, placed ones included.
    #[serde(default)]
    spawned_total: u64,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            container_slots: DEFAULT_CONTAINER_SLOTS,
            properties: BTreeMap::new(),
            structures: BTreeMap::new(),
            entities: BTreeMap::new(),
            next_entity_id: 0,
            players: Vec::new(),
            ticking_areas: BTreeMap::new(),
            spawned_total: 0,
        }
    }
}

impl WorldState {
    fn spawn(&mut self, type_id: &str, location: Vector3, slots: Vec<Option<ItemStack>>) -> EntityId {
        self.next_entity_id += 1;
        self.spawned_total += 1;
        let id = EntityId(self.next_entity_id);
        self.entities.insert(
            id,
            Entity {
                type_id: type_id.to_string(),
                location,
                slots,
            },
        );
        id
    }

    fn entity(&self, id: EntityId) -> HostResult<&Entity> {
        self.entities.get(&id).ok_or(HostError::EntityNotFound(id))
    }

    fn entity_mut(&mut self, id: EntityId) -> HostResult<&mut Entity> {
        self.entities.get_mut(&id).ok_or(HostError::EntityNotFound(id))
    }
}

/// Counts describing the current world, for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorldStats {
    pub properties: usize,
    pub structures: usize,
    pub live_entities: usize,
    pub spawned_total: u64,
    pub players: usize,
    pub ticking_areas: usize,
}

/// Shared in-memory world.
pub struct InMemoryWorld {
    state: RwLock<WorldState>,
}

impl InMemoryWorld {
    /// Create an empty world.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(WorldState::default()),
        }
    }

    /// Create an empty world whose spawned entities have `slots` inventory slots.
    pub fn with_container_slots(slots: usize) -> Self {
        Self {
            state: RwLock::new(WorldState {
                container_slots: slots,
                ..WorldState::default()
            }),
        }
    }

    /// Add a connected player.
    pub fn add_player(&self, name: impl Into<String>, location: Vector3) {
        self.state
            .write()
            .expect("lock poisoned")
            .players
            .push(Player {
                name: name.into(),
                location,
            });
    }

    /// Names of connected players.
    pub fn player_names(&self) -> Vec<String> {
        self.state
            .read()
            .expect("lock poisoned")
            .players
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Ticking areas by name.
    pub fn ticking_areas(&self) -> BTreeMap<String, (Vector3, Vector3)> {
        self.state.read().expect("lock poisoned").ticking_areas.clone()
    }

    /// Number of live entities of any type.
    pub fn live_entities(&self) -> usize {
        self.state.read().expect("lock poisoned").entities.len()
    }

    /// Entities spawned since the world was created.
    pub fn spawned_total(&self) -> u64 {
        self.state.read().expect("lock poisoned").spawned_total
    }

    /// A copy of a saved structure.
    pub fn structure(&self, id: &str) -> Option<StructureSnapshot> {
        self.state
            .read()
            .expect("lock poisoned")
            .structures
            .get(id)
            .cloned()
    }

    pub fn stats(&self) -> WorldStats {
        let state = self.state.read().expect("lock poisoned");
        WorldStats {
            properties: state.properties.len(),
            structures: state.structures.len(),
            live_entities: state.entities.len(),
            spawned_total: state.spawned_total,
            players: state.players.len(),
            ticking_areas: state.ticking_areas.len(),
        }
    }

    /// Serialize the whole world to JSON.
    pub fn to_json(&self) -> HostResult<String> {
        let state = self.state.read().expect("lock poisoned");
        serde_json::to_string_pretty(&*state).map_err(|e| HostError::Serialization(e.to_string()))
    }

    /// Rebuild a world from [`to_json`](Self::to_json) output.
    pub fn from_json(json: &str) -> HostResult<Self> {
        let state: WorldState =
            serde_json::from_str(json).map_err(|e| HostError::Serialization(e.to_string()))?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Write the world to a file.
    pub fn save(&self, path: &Path) -> HostResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "world saved");
        Ok(())
    }

    /// Load a world from a file written by [`save`](Self::save).
    pub fn load(path: &Path) -> HostResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl Default for InMemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("InMemoryWorld")
            .field("properties", &stats.properties)
            .field("structures", &stats.structures)
            .field("live_entities", &stats.live_entities)
            .finish()
    }
}

fn check_identifier(id: &str) -> HostResult<()> {
    if id.is_empty() {
        return Err(HostError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

impl PropertyStore for InMemoryWorld {
    fn get_property(&self, key: &str) -> HostResult<Option<DynamicValue>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.properties.get(key).cloned())
    }

    fn set_property(&self, key: &str, value: Option<DynamicValue>) -> HostResult<()> {
        check_identifier(key)?;
        let mut state = self.state.write().expect("lock poisoned");
        match value {
            Some(value) => {
                state.properties.insert(key.to_string(), value);
            }
            None => {
                state.properties.remove(key);
            }
        }
        Ok(())
    }

    fn property_ids(&self) -> HostResult<Vec<String>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.properties.keys().cloned().collect())
    }
}

impl StructureStore for InMemoryWorld {
    fn structure_exists(&self, id: &str) -> HostResult<bool> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.structures.contains_key(id))
    }

    fn create_structure(&self, id: &str, location: Vector3) -> HostResult<()> {
        check_identifier(id)?;
        let mut state = self.state.write().expect("lock poisoned");
        let entities = state
            .entities
            .values()
            .filter(|e| e.location == location)
            .map(|e| CapturedEntity {
                type_id: e.type_id.clone(),
                slots: e.slots.clone(),
            })
            .collect();
        state
            .structures
            .insert(id.to_string(), StructureSnapshot { entities });
        Ok(())
    }

    fn place_structure(&self, id: &str, location: Vector3) -> HostResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let Some(snapshot) = state.structures.get(id).cloned() else {
            return Ok(false);
        };
        for captured in snapshot.entities {
            state.spawn(&captured.type_id, location, captured.slots);
        }
        Ok(true)
    }

    fn delete_structure(&self, id: &str) -> HostResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        Ok(state.structures.remove(id).is_some())
    }

    fn structure_ids(&self) -> HostResult<Vec<String>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.structures.keys().cloned().collect())
    }
}

impl EntityHost for InMemoryWorld {
    fn spawn_entity(&self, type_id: &str, location: Vector3) -> HostResult<EntityId> {
        check_identifier(type_id)?;
        let mut state = self.state.write().expect("lock poisoned");
        let slots = vec![None; state.container_slots];
        Ok(state.spawn(type_id, location, slots))
    }

    fn entities_at(&self, type_id: &str, location: Vector3) -> HostResult<Vec<EntityId>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .entities
            .iter()
            .filter(|(_, e)| e.type_id == type_id && e.location == location)
            .map(|(id, _)| *id)
            .collect())
    }

    fn remove_entity(&self, id: EntityId) -> HostResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state
            .entities
            .remove(&id)
            .map(|_| ())
            .ok_or(HostError::EntityNotFound(id))
    }

    fn container_size(&self, id: EntityId) -> HostResult<usize> {
        let state = self.state.read().expect("lock poisoned");
        let entity = state.entity(id)?;
        if entity.slots.is_empty() {
            return Err(HostError::NoInventory(id));
        }
        Ok(entity.slots.len())
    }

    fn get_slot(&self, id: EntityId, slot: usize) -> HostResult<Option<ItemStack>> {
        let state = self.state.read().expect("lock poisoned");
        let entity = state.entity(id)?;
        let size = entity.slots.len();
        entity
            .slots
            .get(slot)
            .cloned()
            .ok_or(HostError::SlotOutOfRange { slot, size })
    }

    fn set_slot(&self, id: EntityId, slot: usize, item: Option<&ItemStack>) -> HostResult<()> {
        if let Some(item) = item {
            item.validate()
                .map_err(|e| HostError::RejectedItem(e.to_string()))?;
        }
        let mut state = self.state.write().expect("lock poisoned");
        let entity = state.entity_mut(id)?;
        let size = entity.slots.len();
        let target = entity
            .slots
            .get_mut(slot)
            .ok_or(HostError::SlotOutOfRange { slot, size })?;
        *target = item.cloned();
        Ok(())
    }
}

impl Dimension for InMemoryWorld {
    fn player_location(&self) -> HostResult<Option<Vector3>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.players.first().map(|p| p.location))
    }

    fn add_ticking_area(&self, name: &str, from: Vector3, to: Vector3) -> HostResult<()> {
        check_identifier(name)?;
        let mut state = self.state.write().expect("lock poisoned");
        state.ticking_areas.insert(name.to_string(), (from, to));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARRIER: &str = "test:carrier";

    fn origin() -> Vector3 {
        Vector3::new(0.0, 318.0, 0.0)
    }

    fn stack(id: &str, amount: u8) -> ItemStack {
        ItemStack::new(id, amount).unwrap()
    }

    // -----------------------------------------------------------------------
    // Dynamic properties
    // -----------------------------------------------------------------------

    #[test]
    fn property_set_get_remove() {
        let world = InMemoryWorld::new();
        world.set_property("a:b", Some(DynamicValue::from(2u32))).unwrap();
        assert_eq!(world.get_property("a:b").unwrap(), Some(DynamicValue::Number(2.0)));

        world.set_property("a:b", None).unwrap();
        assert!(world.get_property("a:b").unwrap().is_none());
        assert!(world.property_ids().unwrap().is_empty());
    }

    #[test]
    fn property_prefix_listing() {
        let world = InMemoryWorld::new();
        for key in ["ns:one", "ns:two", "other:one"] {
            world.set_property(key, Some(true.into())).unwrap();
        }
        let ids = world.property_ids_with_prefix("ns:").unwrap();
        assert_eq!(ids, vec!["ns:one".to_string(), "ns:two".to_string()]);
    }

    #[test]
    fn empty_property_key_is_rejected() {
        let world = InMemoryWorld::new();
        assert!(matches!(
            world.set_property("", Some(true.into())),
            Err(HostError::InvalidIdentifier(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Entities and containers
    // -----------------------------------------------------------------------

    #[test]
    fn spawned_entities_are_listed_oldest_first() {
        let world = InMemoryWorld::new();
        let a = world.spawn_entity(CARRIER, origin()).unwrap();
        let b = world.spawn_entity(CARRIER, origin()).unwrap();
        world.spawn_entity("test:other", origin()).unwrap();
        world
            .spawn_entity(CARRIER, Vector3::new(5.0, 318.0, 0.0))
            .unwrap();
        assert_eq!(world.entities_at(CARRIER, origin()).unwrap(), vec![a, b]);
    }

    #[test]
    fn container_slots_round_trip() {
        let world = InMemoryWorld::with_container_slots(4);
        let id = world.spawn_entity(CARRIER, origin()).unwrap();
        assert_eq!(world.container_size(id).unwrap(), 4);

        world.set_slot(id, 3, Some(&stack("apple", 2))).unwrap();
        assert_eq!(world.get_slot(id, 3).unwrap(), Some(stack("apple", 2)));
        world.set_slot(id, 3, None).unwrap();
        assert!(world.get_slot(id, 3).unwrap().is_none());
    }

    #[test]
    fn slot_out_of_range() {
        let world = InMemoryWorld::with_container_slots(2);
        let id = world.spawn_entity(CARRIER, origin()).unwrap();
        assert!(matches!(
            world.get_slot(id, 2),
            Err(HostError::SlotOutOfRange { slot: 2, size: 2 })
        ));
    }

    #[test]
    fn invalid_item_is_rejected() {
        let world = InMemoryWorld::new();
        let id = world.spawn_entity(CARRIER, origin()).unwrap();
        let mut bad = stack("stone", 1);
        bad.amount = 0;
        assert!(matches!(
            world.set_slot(id, 0, Some(&bad)),
            Err(HostError::RejectedItem(_))
        ));
    }

    #[test]
    fn removed_entity_is_gone() {
        let world = InMemoryWorld::new();
        let id = world.spawn_entity(CARRIER, origin()).unwrap();
        world.remove_entity(id).unwrap();
        assert!(matches!(world.remove_entity(id), Err(HostError::EntityNotFound(_))));
        assert_eq!(world.live_entities(), 0);
        assert_eq!(world.spawned_total(), 1);
    }

    // -----------------------------------------------------------------------
    // Structures
    // -----------------------------------------------------------------------

    #[test]
    fn structure_captures_and_places_entities() {
        let world = InMemoryWorld::with_container_slots(2);
        let a = world.spawn_entity(CARRIER, origin()).unwrap();
        let b = world.spawn_entity(CARRIER, origin()).unwrap();
        world.set_slot(a, 0, Some(&stack("a", 1))).unwrap();
        world.set_slot(b, 1, Some(&stack("b", 2))).unwrap();

        world.create_structure("ns:key", origin()).unwrap();
        world.remove_entity(a).unwrap();
        world.remove_entity(b).unwrap();

        assert!(world.structure_exists("ns:key").unwrap());
        assert!(world.place_structure("ns:key", origin()).unwrap());

        let placed = world.entities_at(CARRIER, origin()).unwrap();
        assert_eq!(placed.len(), 2);
        assert_eq!(world.get_slot(placed[0], 0).unwrap(), Some(stack("a", 1)));
        assert_eq!(world.get_slot(placed[1], 1).unwrap(), Some(stack("b", 2)));
    }

    #[test]
    fn placing_missing_structure_reports_false() {
        let world = InMemoryWorld::new();
        assert!(!world.place_structure("nope", origin()).unwrap());
        assert_eq!(world.live_entities(), 0);
    }

    #[test]
    fn delete_structure_is_idempotent() {
        let world = InMemoryWorld::new();
        world.create_structure("x", origin()).unwrap();
        assert!(world.delete_structure("x").unwrap());
        assert!(!world.delete_structure("x").unwrap());
    }

    // -----------------------------------------------------------------------
    // Dimension and persistence
    // -----------------------------------------------------------------------

    #[test]
    fn first_player_location() {
        let world = InMemoryWorld::new();
        assert!(world.player_location().unwrap().is_none());
        world.add_player("Alice", Vector3::new(10.0, 64.0, -4.0));
        world.add_player("Bob", Vector3::new(0.0, 70.0, 0.0));
        assert_eq!(
            world.player_location().unwrap(),
            Some(Vector3::new(10.0, 64.0, -4.0))
        );
    }

    #[test]
    fn world_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");

        let world = InMemoryWorld::with_container_slots(8);
        world.set_property("k", Some("v".into())).unwrap();
        let id = world.spawn_entity(CARRIER, origin()).unwrap();
        world.set_slot(id, 0, Some(&stack("gold_ingot", 9))).unwrap();
        world.create_structure("s", origin()).unwrap();
        world
            .add_ticking_area("area", origin(), origin().above(1.0))
            .unwrap();
        world.save(&path).unwrap();

        let loaded = InMemoryWorld::load(&path).unwrap();
        assert_eq!(loaded.stats(), world.stats());
        assert_eq!(loaded.structure("s"), world.structure("s"));
        assert_eq!(loaded.get_property("k").unwrap(), Some("v".into()));
        // New entities continue the id sequence.
        let next = loaded.spawn_entity(CARRIER, origin()).unwrap();
        assert!(next > id);
    }

    #[test]
    fn corrupt_world_file_is_a_serialization_error() {
        assert!(matches!(
            InMemoryWorld::from_json("{ not json"),
            Err(HostError::Serialization(_))
        ));
    }
}
