//! Spill carriers: short-lived storage entities whose containers hold an
//! entry while it is written to or read from its structure snapshot.
//!
//! Every operation here materializes the carriers for one key at the storage
//! location, does its work, snapshots them, and removes every carrier again.
//! No carrier outlives the call, whether it succeeds or not.

use tracing::{debug, warn};

use kisu_host::{EntityId, HostBindings, HostError};
use kisu_types::{DynamicValue, ItemList, ItemStack, Vector3};

use crate::config::MAX_KEY_LENGTH;
use crate::error::{QidbError, QidbResult};

/// Entity type spawned as a carrier.
pub const STORAGE_ENTITY: &str = "qidb:storage";

/// Slots per carrier container.
pub const CARRIER_CAPACITY: usize = 256;

/// Carriers needed to hold `len` slots; at least one.
pub fn required_carriers(len: usize) -> usize {
    if len == 0 {
        1
    } else {
        (len - 1) / CARRIER_CAPACITY + 1
    }
}

/// Check a full key against the structure id length limit.
pub fn check_key_length(full_key: &str) -> QidbResult<()> {
    let len = full_key.chars().count();
    if len > MAX_KEY_LENGTH {
        return Err(QidbError::Range {
            key: full_key.to_string(),
            reason: format!("has {len} characters, more than {MAX_KEY_LENGTH}"),
        });
    }
    Ok(())
}

/// Live carriers for one key.
struct Carriers {
    /// Whether they were placed from an existing snapshot.
    existing: bool,
    ids: Vec<EntityId>,
}

/// The storage location and the host it lives in.
pub(crate) struct CarrierSite<'a> {
    host: &'a HostBindings,
    location: Vector3,
    log_load: bool,
}

impl<'a> CarrierSite<'a> {
    pub(crate) fn new(host: &'a HostBindings, location: Vector3, log_load: bool) -> Self {
        Self {
            host,
            location,
            log_load,
        }
    }

    /// Bring the carriers for `full_key` to life.
    ///
    /// An existing snapshot is placed; otherwise `required` empty carriers are
    /// spawned. With `required` set, the live set is then grown or shrunk
    /// from the end to exactly that many.
    fn materialize(&self, full_key: &str, required: Option<usize>) -> QidbResult<Carriers> {
        check_key_length(full_key)?;
        // Strays from an interrupted operation would be captured as ours.
        self.despawn_all()?;

        let existing = self
            .host
            .structures
            .place_structure(full_key, self.location)?;
        if !existing {
            for _ in 0..required.unwrap_or(0) {
                self.spawn()?;
            }
        }

        let mut ids = self
            .host
            .entities
            .entities_at(STORAGE_ENTITY, self.location)?;
        if let Some(required) = required {
            while ids.len() < required {
                ids.push(self.spawn()?);
            }
            while ids.len() > required {
                if let Some(id) = ids.pop() {
                    self.host.entities.remove_entity(id)?;
                }
            }
        }

        if self.log_load {
            debug!(key = full_key, carriers = ids.len(), existing, "carriers loaded");
        }
        Ok(Carriers { existing, ids })
    }

    fn spawn(&self) -> QidbResult<EntityId> {
        Ok(self
            .host
            .entities
            .spawn_entity(STORAGE_ENTITY, self.location)?)
    }

    /// Replace the snapshot of `full_key` with the live carriers, then remove
    /// them.
    fn snapshot(&self, full_key: &str, existing: bool) -> QidbResult<()> {
        if existing {
            self.host.structures.delete_structure(full_key)?;
        }
        self.host
            .structures
            .create_structure(full_key, self.location)?;
        self.despawn_all()
    }

    /// Remove every carrier standing at the storage location.
    pub(crate) fn despawn_all(&self) -> QidbResult<()> {
        for id in self
            .host
            .entities
            .entities_at(STORAGE_ENTITY, self.location)?
        {
            self.host.entities.remove_entity(id)?;
        }
        Ok(())
    }

    /// Write an entry out to its snapshot and update its marker.
    ///
    /// `None` empties every slot and removes the marker. A placement the host
    /// rejects fails with [`QidbError::InvalidValueType`] and leaves the
    /// previous snapshot untouched.
    pub(crate) fn write(&self, full_key: &str, value: Option<&ItemList>) -> QidbResult<()> {
        let required = value.map_or(1, |v| required_carriers(v.len()));
        let result = self
            .materialize(full_key, Some(required))
            .and_then(|carriers| {
                self.fill(full_key, &carriers.ids, value)?;
                self.snapshot(full_key, carriers.existing)?;
                let marker = value.map(|_| DynamicValue::from(required as f64));
                Ok(self.host.properties.set_property(full_key, marker)?)
            });
        self.despawn_on_error(full_key, result)
    }

    /// Remove every carrier if `result` is an error, then pass it on.
    fn despawn_on_error<T>(&self, full_key: &str, result: QidbResult<T>) -> QidbResult<T> {
        if result.is_err() {
            if let Err(cleanup) = self.despawn_all() {
                warn!(key = full_key, error = %cleanup, "failed to remove carriers");
            }
        }
        result
    }

    fn fill(&self, full_key: &str, ids: &[EntityId], value: Option<&ItemList>) -> QidbResult<()> {
        for (index, &id) in ids.iter().enumerate() {
            for slot in 0..CARRIER_CAPACITY {
                let item: Option<&ItemStack> =
                    value.and_then(|v| v.get(index * CARRIER_CAPACITY + slot));
                self.host
                    .entities
                    .set_slot(id, slot, item)
                    .map_err(|e| match e {
                        HostError::RejectedItem(reason) => QidbError::InvalidValueType {
                            key: full_key.to_string(),
                            reason,
                        },
                        other => QidbError::Host(other),
                    })?;
            }
        }
        Ok(())
    }

    /// Read an entry back from its snapshot.
    ///
    /// Trailing empty slots of the last carrier are dropped. The snapshot is
    /// captured again afterwards.
    pub(crate) fn read(&self, full_key: &str) -> QidbResult<ItemList> {
        let result = self.materialize(full_key, None).and_then(|carriers| {
            if !carriers.existing {
                return Ok(ItemList::new());
            }
            let slots = self.read_slots(&carriers.ids)?;
            self.snapshot(full_key, carriers.existing)?;
            Ok(ItemList::from_slots(slots))
        });
        self.despawn_on_error(full_key, result)
    }

    fn read_slots(&self, ids: &[EntityId]) -> QidbResult<Vec<Option<ItemStack>>> {
        let mut slots = Vec::with_capacity(ids.len() * CARRIER_CAPACITY);
        for &id in ids {
            let size = self.host.entities.container_size(id)?.min(CARRIER_CAPACITY);
            for slot in 0..size {
                slots.push(self.host.entities.get_slot(id, slot)?);
            }
        }
        let last_window = ids.len().saturating_sub(1) * CARRIER_CAPACITY;
        while slots.len() > last_window && matches!(slots.last(), Some(None)) {
            slots.pop();
        }
        Ok(slots)
    }
}
