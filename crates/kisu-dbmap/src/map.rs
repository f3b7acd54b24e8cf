//! The [`DatabaseMap`] record map.

use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use kisu_host::{PropertyStore, Scheduler};
use kisu_types::DynamicValue;

use crate::clear::{ClearHandle, ClearJob};
use crate::error::{MapError, MapResult};
use crate::names::{composite_key, map_prefix, split_composite, validate_id, validate_key};
use crate::records::Records;

/// State shared between a map handle and any clear job it started.
pub(crate) struct MapInner<T> {
    pub(crate) id: String,
    pub(crate) properties: Arc<dyn PropertyStore>,
    pub(crate) records: RwLock<Records<T>>,
}

impl<T> MapInner<T> {
    /// Remove one record from the substrate and from memory.
    pub(crate) fn remove_record(&self, key: &str) -> MapResult<bool> {
        let mut records = self.records.write().expect("lock poisoned");
        self.properties
            .set_property(&composite_key(&self.id, key), None)?;
        Ok(records.remove(key).is_some())
    }

    /// Remove `key` only if its latest write is still `generation`.
    pub(crate) fn remove_unchanged(&self, key: &str, generation: u64) -> MapResult<bool> {
        let mut records = self.records.write().expect("lock poisoned");
        if records.generation(key) != Some(generation) {
            return Ok(false);
        }
        self.properties
            .set_property(&composite_key(&self.id, key), None)?;
        Ok(records.remove(key).is_some())
    }
}

/// A map of JSON records mirrored key-by-key into dynamic properties.
///
/// Cloning the handle shares the same in-memory state. Opening a second map
/// over the same id produces an independent snapshot of what was persisted at
/// that moment.
pub struct DatabaseMap<T> {
    inner: Arc<MapInner<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DatabaseMap<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> DatabaseMap<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open map `id`, loading every record persisted under it.
    ///
    /// Scans the whole property substrate once. Properties that are not
    /// strings or do not parse as `T` are skipped.
    pub fn open(properties: Arc<dyn PropertyStore>, id: impl Into<String>) -> MapResult<Self> {
        let id = id.into();
        validate_id(&id)?;

        let prefix = map_prefix(&id);
        let mut records = Records::new();
        let mut skipped = 0usize;
        for property_id in properties.property_ids_with_prefix(&prefix)? {
            let Some((owner, key)) = split_composite(&property_id) else {
                continue;
            };
            // A longer id that happens to share our prefix.
            if owner != id {
                continue;
            }
            let Some(DynamicValue::String(json)) = properties.get_property(&property_id)? else {
                skipped += 1;
                continue;
            };
            match serde_json::from_str::<T>(&json) {
                Ok(value) => {
                    records.insert(key.to_string(), value);
                }
                Err(e) => {
                    skipped += 1;
                    debug!(map = %id, key, error = %e, "skipping unreadable record");
                }
            }
        }

        if skipped > 0 {
            warn!(map = %id, skipped, "dropped records that could not be read");
        }
        debug!(map = %id, records = records.len(), "map loaded");

        Ok(Self {
            inner: Arc::new(MapInner {
                id,
                properties,
                records: RwLock::new(records),
            }),
            _marker: PhantomData,
        })
    }

    /// The map id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.inner.records.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a record, writing it through to the substrate.
    pub fn set(&self, key: &str, value: T) -> MapResult<()> {
        validate_key(key)?;
        let json =
            serde_json::to_string(&value).map_err(|e| MapError::Serialization(e.to_string()))?;
        let mut records = self.inner.records.write().expect("lock poisoned");
        self.inner.properties.set_property(
            &composite_key(&self.inner.id, key),
            Some(DynamicValue::String(json)),
        )?;
        records.insert(key.to_string(), value);
        Ok(())
    }

    /// Insert a record only if `key` is not present yet.
    ///
    /// Returns `true` if the record was written.
    pub fn set_if_absent(&self, key: &str, value: T) -> MapResult<bool> {
        if self.has(key) {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    /// A copy of the record under `key`.
    pub fn get(&self, key: &str) -> Option<T> {
        self.inner
            .records
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner
            .records
            .read()
            .expect("lock poisoned")
            .contains(key)
    }

    /// Remove a record. Returns `true` if it existed.
    pub fn delete(&self, key: &str) -> MapResult<bool> {
        if !self.has(key) {
            return Ok(false);
        }
        self.inner.remove_record(key)
    }

    /// Replace a record with `f(current)`; `None` deletes it.
    ///
    /// Does nothing if `key` is absent.
    pub fn edit(&self, key: &str, f: impl FnOnce(T) -> Option<T>) -> MapResult<()> {
        let Some(current) = self.get(key) else {
            return Ok(());
        };
        match f(current) {
            Some(next) => self.set(key, next),
            None => self.delete(key).map(|_| ()),
        }
    }

    /// Remove every property under this map's prefix immediately, including
    /// records that could not be loaded.
    pub fn clear(&self) -> MapResult<()> {
        let inner = &self.inner;
        let mut records = inner.records.write().expect("lock poisoned");
        for property_id in inner
            .properties
            .property_ids_with_prefix(&map_prefix(&inner.id))?
        {
            let Some((owner, key)) = split_composite(&property_id) else {
                continue;
            };
            if owner != inner.id {
                continue;
            }
            inner.properties.set_property(&property_id, None)?;
            records.remove(key);
        }
        records.clear();
        debug!(map = %inner.id, "map cleared");
        Ok(())
    }

    /// Remove every record, one per scheduler tick.
    ///
    /// A record written again after this call keeps its new value. Reads keep
    /// seeing the records that have not been removed yet.
    pub fn clear_job(&self, scheduler: &dyn Scheduler) -> ClearHandle {
        let keys = self
            .inner
            .records
            .read()
            .expect("lock poisoned")
            .stamped_keys();
        let job = ClearJob::new(self.inner.clone(), keys);
        let handle = job.handle();
        scheduler.run_job(Box::new(job));
        handle
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner
            .records
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.inner
            .records
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, T)> {
        self.inner
            .records
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<'a, T> IntoIterator for &'a DatabaseMap<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries().into_iter()
    }
}

impl<T> std::fmt::Debug for DatabaseMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.records.read().expect("lock poisoned").len();
        f.debug_struct("DatabaseMap")
            .field("id", &self.inner.id)
            .field("records", &count)
            .finish()
    }
}
