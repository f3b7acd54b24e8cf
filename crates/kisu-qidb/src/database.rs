//! The [`QuickItemDatabase`] store.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use kisu_host::{HostBindings, RunId};
use kisu_types::{DynamicValue, ItemList, ItemStack, Vector3};

use crate::cache::QuickCache;
use crate::carrier::{check_key_length, required_carriers, CarrierSite};
use crate::config::{
    ItemDatabaseConfig, MAX_ENTRY_ITEMS, SAVE_DELAY_SECONDS, TICKS_PER_SECOND,
};
use crate::error::{QidbError, QidbResult};
use crate::location::resolve_location;
use crate::queue::SaveQueue;

/// Ticks between progress reports while the queue drains.
pub const PROGRESS_INTERVAL_TICKS: u32 = SAVE_DELAY_SECONDS * TICKS_PER_SECOND;

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

struct State {
    cache: QuickCache,
    queue: SaveQueue,
    location: Option<Vector3>,
    flush_run: Option<RunId>,
    progress_run: Option<RunId>,
    /// Queue length at the previous progress report.
    last_reported: usize,
    /// Whether the last flush pass wrote anything.
    saving: bool,
}

struct Inner {
    config: ItemDatabaseConfig,
    host: HostBindings,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }

    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Deferred start: register the flush loop and the shutdown check, and
    /// try to resolve the storage location.
    fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let flush_run = self.host.scheduler.run_interval(
            1,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush_tick();
                }
            }),
        );

        let weak = Arc::downgrade(self);
        self.host.scheduler.on_shutdown(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.report_lost_entries();
            }
        }));

        let mut state = self.lock();
        state.flush_run = Some(flush_run);
        self.ensure_location(&mut state);
    }

    fn ensure_location(&self, state: &mut State) -> Option<Vector3> {
        if state.location.is_some() {
            return state.location;
        }
        match resolve_location(&*self.host.properties, &*self.host.dimension) {
            Ok(Some(location)) => {
                state.location = Some(location);
                self.log_start_up(location);
                Some(location)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(namespace = self.namespace(), error = %e, "failed to resolve storage location");
                None
            }
        }
    }

    fn log_start_up(&self, location: Vector3) {
        if self.config.logs.start_up {
            info!(
                namespace = self.namespace(),
                location = %location,
                cache_size = self.config.cache_size,
                save_rate = self.config.save_rate,
                "item database initialised"
            );
        }
        if self.config.save_rate > 1 {
            warn!(
                namespace = self.namespace(),
                save_rate = self.config.save_rate,
                "a save rate above 1 can stall ticks while large entries are written"
            );
        }
    }

    /// One pass of the flush loop.
    fn flush_tick(self: &Arc<Self>) {
        let mut state = self.lock();

        let evicted = state.cache.evict_to(self.config.cache_size);
        if !evicted.is_empty() {
            debug!(namespace = self.namespace(), evicted = evicted.len(), "cache trimmed");
        }

        let Some(location) = self.ensure_location(&mut state) else {
            return;
        };

        if state.queue.is_empty() {
            if let Some(run) = state.progress_run.take() {
                self.host.scheduler.clear_run(run);
                if state.saving && self.config.logs.save {
                    info!(namespace = self.namespace(), "saved, you can now close the world safely");
                }
                state.saving = false;
            }
            return;
        }

        if state.progress_run.is_none() {
            state.last_reported = state.queue.len();
            self.report_progress(&mut state);
            let weak = Arc::downgrade(self);
            let run = self.host.scheduler.run_interval(
                PROGRESS_INTERVAL_TICKS,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        let mut state = inner.lock();
                        inner.report_progress(&mut state);
                    }
                }),
            );
            state.progress_run = Some(run);
        }
        state.saving = true;

        let now = self.host.scheduler.current_tick();
        let site = CarrierSite::new(&self.host, location, self.config.logs.load);
        for _ in 0..self.config.save_rate {
            let Some(entry) = state.queue.pop_front() else {
                break;
            };
            let started = Instant::now();
            match site.write(&entry.key, Some(&entry.value)) {
                Ok(()) => {
                    if self.config.logs.save {
                        debug!(
                            namespace = self.namespace(),
                            key = %entry.key,
                            items = entry.value.len(),
                            waited_ticks = now.saturating_sub(entry.enqueued_at),
                            elapsed_ms = elapsed_ms(started),
                            "entry saved"
                        );
                    }
                }
                Err(e) => {
                    error!(namespace = self.namespace(), key = %entry.key, error = %e, "failed to save entry");
                }
            }
        }
    }

    fn report_progress(&self, state: &mut State) {
        if !self.config.logs.save {
            return;
        }
        let remaining = state.queue.len();
        let saved = state.last_reported.saturating_sub(remaining);
        state.last_reported = remaining;
        info!(
            namespace = self.namespace(),
            remaining,
            entries_per_second = saved / SAVE_DELAY_SECONDS as usize,
            "saving, do not close the world"
        );
    }

    fn report_lost_entries(&self) {
        let state = self.lock();
        if !state.queue.is_empty() {
            error!(
                namespace = self.namespace(),
                lost = state.queue.len(),
                oldest_tick = ?state.queue.oldest_tick(),
                "world closed too early, items not saved correctly"
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for run in [state.flush_run.take(), state.progress_run.take()]
            .into_iter()
            .flatten()
        {
            self.host.scheduler.clear_run(run);
        }
    }
}

/// Item-stack store with a write-back cache and a rate-limited save queue.
///
/// Writes land in the quick-access cache at once and are queued; the flush
/// loop writes `save_rate` queued entries per tick to structure snapshots
/// through short-lived carrier entities. Reads are served from the cache or
/// the queue when possible and fall back to the snapshot otherwise.
///
/// The store starts on the tick after construction. Queued entries are only
/// written once a storage location is known, which needs either a location
/// persisted by an earlier session or a connected player.
pub struct QuickItemDatabase {
    inner: Arc<Inner>,
}

impl QuickItemDatabase {
    /// Create a store and schedule its start for the next tick.
    ///
    /// Fails with [`QidbError::Configuration`] for an invalid or reserved
    /// namespace, before anything is scheduled.
    pub fn new(config: ItemDatabaseConfig, host: HostBindings) -> QidbResult<Self> {
        if let Err(e) = config.validate() {
            error!(namespace = %config.namespace, error = %e, "rejected item database configuration");
            return Err(e);
        }

        let inner = Arc::new(Inner {
            config,
            host,
            state: Mutex::new(State {
                cache: QuickCache::new(),
                queue: SaveQueue::new(),
                location: None,
                flush_run: None,
                progress_run: None,
                last_reported: 0,
                saving: false,
            }),
        });

        let weak = Arc::downgrade(&inner);
        inner.host.scheduler.run_once(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.start();
            }
        }));

        Ok(Self { inner })
    }

    pub fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    pub fn config(&self) -> &ItemDatabaseConfig {
        &self.inner.config
    }

    /// The storage location, once resolved.
    pub fn location(&self) -> Option<Vector3> {
        self.inner.lock().location
    }

    /// Entries waiting to be written out.
    pub fn queued_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Entries in the quick-access cache.
    pub fn cache_len(&self) -> usize {
        self.inner.lock().cache.len()
    }

    /// Whether the flush loop is currently draining the queue.
    pub fn is_saving(&self) -> bool {
        self.inner.lock().progress_run.is_some()
    }

    fn full_key(&self, identifier: &str) -> QidbResult<String> {
        if identifier.is_empty() {
            return Err(QidbError::MissingIdentifier);
        }
        Ok(format!("{}:{identifier}", self.namespace()))
    }

    /// Store `value` under `identifier`.
    ///
    /// The value is visible to reads immediately and written out by the
    /// flush loop later. Fails with [`QidbError::Range`] for more than 1024
    /// slots or a full key over 30 characters; nothing changes in that case.
    pub fn set(&self, identifier: &str, value: impl Into<ItemList>) -> QidbResult<()> {
        let started = Instant::now();
        let full_key = self.full_key(identifier)?;
        let value = value.into();

        if value.len() > MAX_ENTRY_ITEMS {
            error!(namespace = self.namespace(), key = %full_key, items = value.len(), "entry has too many items");
            return Err(QidbError::Range {
                key: full_key,
                reason: format!("has more than {MAX_ENTRY_ITEMS} items"),
            });
        }
        if let Err(e) = check_key_length(&full_key) {
            error!(namespace = self.namespace(), error = %e, "entry key too long");
            return Err(e);
        }

        let required = required_carriers(value.len());
        self.inner
            .host
            .properties
            .set_property(&full_key, Some(DynamicValue::from(required as f64)))?;

        let tick = self.inner.host.scheduler.current_tick();
        let items = value.len();
        let mut state = self.inner.lock();
        state.cache.insert(full_key.clone(), value.clone());
        let replaced = state.queue.enqueue(full_key.clone(), value, tick);

        if self.inner.config.logs.set {
            debug!(
                namespace = self.namespace(),
                key = %full_key,
                items,
                replaced,
                elapsed_ms = elapsed_ms(started),
                "entry set"
            );
        }
        Ok(())
    }

    /// Store a single stack under `identifier`.
    pub fn set_one(&self, identifier: &str, item: ItemStack) -> QidbResult<()> {
        self.set(identifier, item)
    }

    /// The entry under `identifier`, from the cache if possible.
    ///
    /// A cold read materializes the entry's carriers, reads them, captures
    /// the snapshot again and caches the result. Returns `Ok(None)` if the
    /// entry does not exist.
    pub fn get(&self, identifier: &str) -> QidbResult<Option<ItemList>> {
        let started = Instant::now();
        let full_key = self.full_key(identifier)?;
        let logs = &self.inner.config.logs;
        let mut state = self.inner.lock();

        if let Some(value) = state.cache.get(&full_key) {
            if logs.get {
                debug!(namespace = self.namespace(), key = %full_key, elapsed_ms = elapsed_ms(started), "entry read from cache");
            }
            return Ok(Some(value.clone()));
        }

        // Evicted but not written out yet.
        if let Some(entry) = state.queue.get(&full_key) {
            let value = entry.value.clone();
            state.cache.insert(full_key.clone(), value.clone());
            if logs.get {
                debug!(namespace = self.namespace(), key = %full_key, elapsed_ms = elapsed_ms(started), "entry read from save queue");
            }
            return Ok(Some(value));
        }

        if !self.inner.host.structures.structure_exists(&full_key)? {
            warn!(namespace = self.namespace(), key = %full_key, "key does not exist");
            return Ok(None);
        }

        let Some(location) = state.location else {
            return Err(QidbError::NotInitialised(full_key));
        };
        let site = CarrierSite::new(&self.inner.host, location, logs.load);
        let value = site.read(&full_key)?;
        state.cache.insert(full_key.clone(), value.clone());

        if logs.get {
            debug!(
                namespace = self.namespace(),
                key = %full_key,
                items = value.len(),
                elapsed_ms = elapsed_ms(started),
                "entry read from snapshot"
            );
        }
        Ok(Some(value))
    }

    /// The stack in the first slot of the entry under `identifier`.
    pub fn get_one(&self, identifier: &str) -> QidbResult<Option<ItemStack>> {
        Ok(self
            .get(identifier)?
            .and_then(|list| list.into_slots().into_iter().next().flatten()))
    }

    /// The cached entry under `identifier`.
    ///
    /// Never touches the world. Returns `Ok(None)` for an entry that was
    /// evicted, even if it is persisted.
    pub fn quick_get(&self, identifier: &str) -> QidbResult<Option<ItemList>> {
        let full_key = self.full_key(identifier)?;
        let value = self.inner.lock().cache.get(&full_key).cloned();
        if self.inner.config.logs.get {
            debug!(namespace = self.namespace(), key = %full_key, hit = value.is_some(), "quick read");
        }
        Ok(value)
    }

    /// Whether `identifier` is in the cache. May be `false` for a persisted
    /// entry.
    pub fn quick_has(&self, identifier: &str) -> bool {
        match self.full_key(identifier) {
            Ok(full_key) => self.inner.lock().cache.contains(&full_key),
            Err(_) => false,
        }
    }

    /// Whether `identifier` exists in the cache, the save queue or a
    /// snapshot. Never materializes carriers.
    pub fn has(&self, identifier: &str) -> QidbResult<bool> {
        let full_key = self.full_key(identifier)?;
        let pending = {
            let state = self.inner.lock();
            state.cache.contains(&full_key) || state.queue.contains(&full_key)
        };
        let found = pending || self.inner.host.structures.structure_exists(&full_key)?;

        if self.inner.config.logs.has {
            debug!(namespace = self.namespace(), key = %full_key, found, "has");
        }
        Ok(found)
    }

    /// Remove the entry under `identifier` from the cache, the save queue,
    /// the snapshot store and the marker. Returns whether it existed.
    pub fn delete(&self, identifier: &str) -> QidbResult<bool> {
        let started = Instant::now();
        let full_key = self.full_key(identifier)?;

        let (in_cache, in_queue) = {
            let mut state = self.inner.lock();
            (
                state.cache.remove(&full_key).is_some(),
                state.queue.remove(&full_key).is_some(),
            )
        };
        let in_structure = self.inner.host.structures.delete_structure(&full_key)?;
        self.inner.host.properties.set_property(&full_key, None)?;

        let existed = in_cache || in_queue || in_structure;
        if self.inner.config.logs.delete {
            debug!(
                namespace = self.namespace(),
                key = %full_key,
                existed,
                elapsed_ms = elapsed_ms(started),
                "entry deleted"
            );
        }
        Ok(existed)
    }

    /// Identifiers of every entry, from the markers in the property store.
    pub fn keys(&self) -> QidbResult<Vec<String>> {
        let prefix = format!("{}:", self.namespace());
        let keys: Vec<String> = self
            .inner
            .host
            .properties
            .property_ids_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|id| id.strip_prefix(&prefix).map(str::to_string))
            .collect();
        if self.inner.config.logs.keys {
            debug!(namespace = self.namespace(), count = keys.len(), "listed keys");
        }
        Ok(keys)
    }

    /// Every entry's value. Reads each entry, so cold entries are loaded
    /// from their snapshots.
    pub fn values(&self) -> QidbResult<Vec<ItemList>> {
        let started = Instant::now();
        let mut values = Vec::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                values.push(value);
            }
        }
        if self.inner.config.logs.values {
            debug!(
                namespace = self.namespace(),
                count = values.len(),
                elapsed_ms = elapsed_ms(started),
                "listed values"
            );
        }
        Ok(values)
    }

    /// Delete every entry. Returns how many markers were processed.
    pub fn clear(&self) -> QidbResult<usize> {
        let started = Instant::now();
        let keys = self.keys()?;
        for key in &keys {
            self.delete(key)?;
        }
        if self.inner.config.logs.clear {
            info!(
                namespace = self.namespace(),
                deleted = keys.len(),
                elapsed_ms = elapsed_ms(started),
                "cleared"
            );
        }
        Ok(keys.len())
    }
}

impl std::fmt::Debug for QuickItemDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("QuickItemDatabase")
            .field("namespace", &self.inner.config.namespace)
            .field("cached", &state.cache.len())
            .field("queued", &state.queue.len())
            .field("location", &state.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kisu_host::{
        EntityHost, InMemoryWorld, PropertyStore, Scheduler, StructureStore, TickScheduler,
    };

    use crate::carrier::STORAGE_ENTITY;
    use crate::config::ItemDatabaseLogSettings;

    struct Harness {
        world: Arc<InMemoryWorld>,
        sched: Arc<TickScheduler>,
        db: QuickItemDatabase,
    }

    impl Harness {
        fn flush(&self) {
            let db = &self.db;
            self.sched
                .tick_until(10_000, || db.queued_len() == 0)
                .expect("queue never drained");
        }
    }

    fn with_world(world: Arc<InMemoryWorld>, config: ItemDatabaseConfig) -> Harness {
        let sched = Arc::new(TickScheduler::new());
        let host = HostBindings::in_memory(&world, &sched);
        let db = QuickItemDatabase::new(config, host).unwrap();
        sched.tick();
        Harness { world, sched, db }
    }

    fn harness(config: ItemDatabaseConfig) -> Harness {
        let world = Arc::new(InMemoryWorld::new());
        world.add_player("Steve", Vector3::new(8.0, 64.0, 8.0));
        with_world(world, config)
    }

    fn config(namespace: &str) -> ItemDatabaseConfig {
        ItemDatabaseConfig::new(namespace).with_logs(ItemDatabaseLogSettings::all())
    }

    fn stack(id: &str, amount: u8) -> ItemStack {
        ItemStack::new(id, amount).unwrap()
    }

    fn stacks(n: usize) -> ItemList {
        (0..n).map(|i| stack("oak_log", (i % 64 + 1) as u8)).collect()
    }

    fn snapshot_carriers(world: &InMemoryWorld, key: &str) -> usize {
        world.structure(key).map_or(0, |s| s.entities.len())
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn invalid_namespaces_fail_before_scheduling() {
        let world = Arc::new(InMemoryWorld::new());
        let sched = Arc::new(TickScheduler::new());
        for bad in ["bad name!", "qidb", "QIDB", "my_Qidb"] {
            let host = HostBindings::in_memory(&world, &sched);
            let err = QuickItemDatabase::new(ItemDatabaseConfig::new(bad), host).unwrap_err();
            assert!(matches!(err, QidbError::Configuration { .. }), "{bad}");
        }
        assert_eq!(sched.pending_tasks(), 0);

        let host = HostBindings::in_memory(&world, &sched);
        assert!(QuickItemDatabase::new(ItemDatabaseConfig::new("market_v2"), host).is_ok());
    }

    #[test]
    fn start_is_deferred_to_the_next_tick() {
        let world = Arc::new(InMemoryWorld::new());
        world.add_player("Steve", Vector3::new(1.0, 64.0, 2.0));
        let sched = Arc::new(TickScheduler::new());
        let db = QuickItemDatabase::new(
            config("ns"),
            HostBindings::in_memory(&world, &sched),
        )
        .unwrap();
        assert!(db.location().is_none());
        assert!(world.ticking_areas().is_empty());

        sched.tick();
        assert_eq!(db.location(), Some(Vector3::new(1.0, 318.0, 2.0)));
        assert_eq!(world.ticking_areas().len(), 1);
    }

    #[test]
    fn dropping_the_store_stops_its_loop() {
        let h = harness(config("ns"));
        assert_eq!(h.sched.pending_tasks(), 1);
        drop(h.db);
        assert_eq!(h.sched.pending_tasks(), 0);
        h.sched.run_ticks(3);
    }

    // -----------------------------------------------------------------------
    // set / get
    // -----------------------------------------------------------------------

    #[test]
    fn market_item_scenario() {
        let h = harness(
            ItemDatabaseConfig::new("it_market")
                .with_cache_size(5)
                .with_save_rate(1),
        );
        let diamonds = stack("diamond", 64);

        h.db.set("abc12", diamonds.clone()).unwrap();
        assert_eq!(
            h.db.quick_get("abc12").unwrap(),
            Some(ItemList::from(diamonds.clone()))
        );
        assert_eq!(
            h.world.get_property("it_market:abc12").unwrap(),
            Some(DynamicValue::Number(1.0))
        );
        assert_eq!(h.world.spawned_total(), 0);

        h.sched.tick();
        assert_eq!(h.db.queued_len(), 0);
        assert_eq!(
            h.world.get_property("it_market:abc12").unwrap(),
            Some(DynamicValue::Number(1.0))
        );
        assert_eq!(h.world.spawned_total(), 1);
        assert_eq!(h.world.live_entities(), 0);
        assert_eq!(snapshot_carriers(&h.world, "it_market:abc12"), 1);
        assert_eq!(h.db.get_one("abc12").unwrap(), Some(diamonds));
    }

    #[test]
    fn set_is_read_your_writes_without_touching_the_world() {
        let h = harness(config("ns"));
        h.db.set("k", stacks(3)).unwrap();
        assert_eq!(h.db.get("k").unwrap(), Some(stacks(3)));
        assert_eq!(h.world.spawned_total(), 0);
        assert!(h.world.structure_ids().unwrap().is_empty());
    }

    #[test]
    fn stored_value_is_independent_of_caller_copy() {
        let h = harness(config("ns"));
        let mut value = stacks(2);
        h.db.set("k", value.clone()).unwrap();
        value.push(stack("stick", 1));
        assert_eq!(h.db.get("k").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn repeated_set_before_a_tick_writes_once() {
        let h = harness(config("ns"));
        h.db.set("k", stack("apple", 1)).unwrap();
        h.db.set("k", stack("apple", 2)).unwrap();
        assert_eq!(h.db.queued_len(), 1);

        h.sched.tick();
        assert_eq!(h.world.spawned_total(), 1);
        let snapshot = h.world.structure("ns:k").unwrap();
        assert_eq!(snapshot.entities[0].slots[0], Some(stack("apple", 2)));
    }

    #[test]
    fn too_many_items_changes_nothing() {
        let h = harness(config("ns"));
        h.db.set("k", stacks(4)).unwrap();
        h.flush();

        let err = h.db.set("k", stacks(1025)).unwrap_err();
        assert!(matches!(err, QidbError::Range { .. }));
        assert_eq!(h.db.quick_get("k").unwrap(), Some(stacks(4)));
        assert_eq!(h.db.queued_len(), 0);
        assert_eq!(
            h.world.get_property("ns:k").unwrap(),
            Some(DynamicValue::Number(1.0))
        );

        assert!(h.db.set("fresh", stacks(1025)).is_err());
        assert!(h.world.get_property("ns:fresh").unwrap().is_none());
    }

    #[test]
    fn overlong_key_is_rejected_in_set() {
        let h = harness(config("ns"));
        let id = "x".repeat(28);
        assert!(matches!(h.db.set(&id, stacks(1)), Err(QidbError::Range { .. })));
        assert!(h.db.set(&"x".repeat(27), stacks(1)).is_ok());
        assert!(h.world.get_property(&format!("ns:{id}")).unwrap().is_none());
    }

    #[test]
    fn missing_identifier_is_an_error() {
        let h = harness(config("ns"));
        assert!(matches!(h.db.get(""), Err(QidbError::MissingIdentifier)));
        assert!(matches!(h.db.quick_get(""), Err(QidbError::MissingIdentifier)));
        assert!(matches!(h.db.set("", stacks(1)), Err(QidbError::MissingIdentifier)));
        assert!(!h.db.quick_has(""));
    }

    #[test]
    fn get_of_unknown_key_is_none() {
        let h = harness(config("ns"));
        assert_eq!(h.db.get("nope").unwrap(), None);
        assert!(!h.db.has("nope").unwrap());
        assert_eq!(h.world.spawned_total(), 0);
    }

    // -----------------------------------------------------------------------
    // Cache and cold reads
    // -----------------------------------------------------------------------

    #[test]
    fn eviction_keeps_cache_bounded_and_cold_reads_recover() {
        let h = harness(config("ns").with_cache_size(3));
        for i in 0..8 {
            h.db.set(&format!("k{i}"), stacks(i + 1)).unwrap();
        }
        while h.db.queued_len() > 0 {
            h.sched.tick();
            assert!(h.db.cache_len() <= 3);
        }
        h.sched.tick();
        assert!(h.db.cache_len() <= 3);

        for i in 0..5 {
            let id = format!("k{i}");
            assert!(!h.db.quick_has(&id));
            assert!(h.db.has(&id).unwrap());
        }

        let before = h.world.spawned_total();
        assert_eq!(h.db.get("k0").unwrap(), Some(stacks(1)));
        assert_eq!(h.world.spawned_total(), before + 1);
        assert_eq!(h.world.live_entities(), 0);
        assert!(h.db.quick_has("k0"));
    }

    #[test]
    fn evicted_but_queued_value_is_served_from_the_queue() {
        let world = Arc::new(InMemoryWorld::new());
        // No player: the queue cannot drain.
        let h = with_world(world, config("ns").with_cache_size(0));
        h.db.set("k", stacks(2)).unwrap();
        h.sched.tick();
        assert_eq!(h.db.cache_len(), 0);
        assert_eq!(h.db.queued_len(), 1);
        assert!(h.db.has("k").unwrap());
        assert_eq!(h.db.get("k").unwrap(), Some(stacks(2)));
    }

    #[test]
    fn shrinking_an_entry_leaves_one_carrier() {
        let h = harness(config("ns"));
        h.db.set("k", stacks(600)).unwrap();
        h.flush();
        assert_eq!(snapshot_carriers(&h.world, "ns:k"), 3);
        assert_eq!(
            h.world.get_property("ns:k").unwrap(),
            Some(DynamicValue::Number(3.0))
        );

        h.db.set("k", stacks(10)).unwrap();
        h.flush();
        assert_eq!(snapshot_carriers(&h.world, "ns:k"), 1);
        assert!(h
            .world
            .entities_at(STORAGE_ENTITY, h.db.location().unwrap())
            .unwrap()
            .is_empty());
        assert_eq!(h.world.live_entities(), 0);
    }

    #[test]
    fn invalid_item_is_logged_and_does_not_block_the_queue() {
        let h = harness(config("ns").with_save_rate(2));
        let mut broken = stack("stone", 1);
        broken.amount = 0;
        h.db.set("bad", broken).unwrap();
        h.db.set("good", stacks(2)).unwrap();

        h.sched.tick();
        assert_eq!(h.db.queued_len(), 0);
        assert!(h.world.structure_exists("ns:good").unwrap());
        assert!(!h.world.structure_exists("ns:bad").unwrap());
        assert_eq!(h.world.live_entities(), 0);
    }

    // -----------------------------------------------------------------------
    // delete / keys / values / clear
    // -----------------------------------------------------------------------

    #[test]
    fn delete_is_idempotent() {
        let h = harness(config("ns"));
        assert!(!h.db.delete("missing").unwrap());

        h.db.set("k", stacks(1)).unwrap();
        h.flush();
        assert!(h.db.delete("k").unwrap());
        assert!(!h.db.delete("k").unwrap());
        assert!(!h.world.structure_exists("ns:k").unwrap());
        assert!(h.world.get_property("ns:k").unwrap().is_none());
    }

    #[test]
    fn delete_before_flush_drops_the_queued_write() {
        let h = harness(config("ns"));
        h.db.set("k", stacks(1)).unwrap();
        assert!(h.db.delete("k").unwrap());
        h.sched.run_ticks(3);
        assert!(!h.world.structure_exists("ns:k").unwrap());
        assert_eq!(h.db.get("k").unwrap(), None);
    }

    #[test]
    fn delete_tolerates_a_dangling_marker() {
        let h = harness(config("ns"));
        h.world
            .set_property("ns:orphan", Some(DynamicValue::from(1u32)))
            .unwrap();
        assert!(!h.db.delete("orphan").unwrap());
        assert!(h.db.keys().unwrap().is_empty());
    }

    #[test]
    fn keys_values_and_clear() {
        let h = harness(config("ns").with_cache_size(1));
        h.db.set("b", stacks(2)).unwrap();
        h.db.set("a", stacks(1)).unwrap();
        // A marker from another namespace.
        h.world
            .set_property("other:x", Some(DynamicValue::from(1u32)))
            .unwrap();
        h.flush();
        h.sched.tick();

        assert_eq!(h.db.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        let values = h.db.values().unwrap();
        assert_eq!(values, vec![stacks(1), stacks(2)]);

        assert_eq!(h.db.clear().unwrap(), 2);
        assert!(h.db.keys().unwrap().is_empty());
        assert!(h.world.structure_ids().unwrap().is_empty());
        assert!(h.world.get_property("other:x").unwrap().is_some());
    }

    #[test]
    fn legacy_false_marker_is_listed() {
        let h = harness(config("ns"));
        h.world
            .set_property("ns:old", Some(DynamicValue::Bool(false)))
            .unwrap();
        assert_eq!(h.db.keys().unwrap(), vec!["old".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Location, progress and shutdown
    // -----------------------------------------------------------------------

    #[test]
    fn queue_waits_for_a_location() {
        let world = Arc::new(InMemoryWorld::new());
        let h = with_world(world, config("ns"));
        assert!(h.db.location().is_none());

        h.db.set("k", stacks(1)).unwrap();
        h.sched.run_ticks(5);
        assert_eq!(h.db.queued_len(), 1);
        assert_eq!(h.world.spawned_total(), 0);

        h.world.add_player("Alex", Vector3::new(-3.0, 70.0, 9.0));
        h.sched.tick();
        assert_eq!(h.db.location(), Some(Vector3::new(-3.0, 318.0, 9.0)));
        assert_eq!(h.db.queued_len(), 0);
        assert!(h.world.structure_exists("ns:k").unwrap());
    }

    #[test]
    fn cold_read_before_location_is_not_initialised() {
        let world = Arc::new(InMemoryWorld::new());
        world
            .create_structure("ns:k", Vector3::new(0.0, 318.0, 0.0))
            .unwrap();
        let h = with_world(world, config("ns"));
        assert!(matches!(h.db.get("k"), Err(QidbError::NotInitialised(_))));
    }

    #[test]
    fn persisted_location_survives_a_restart() {
        let first = harness(config("ns"));
        first.db.set("k", stacks(7)).unwrap();
        first.flush();
        let location = first.db.location();
        let json = first.world.to_json().unwrap();
        drop(first);

        // Reloaded from its persisted form.
        let world = Arc::new(InMemoryWorld::from_json(&json).unwrap());
        let h = with_world(world, config("ns"));
        assert_eq!(h.db.location(), location);
        assert_eq!(h.db.get("k").unwrap(), Some(stacks(7)));
        assert_eq!(h.world.ticking_areas().len(), 1);
    }

    #[test]
    fn saving_flag_follows_the_queue() {
        let h = harness(config("ns"));
        h.db.set("a", stacks(1)).unwrap();
        h.db.set("b", stacks(1)).unwrap();
        assert!(!h.db.is_saving());

        h.sched.tick();
        assert!(h.db.is_saving());
        h.sched.tick();
        assert_eq!(h.db.queued_len(), 0);
        assert!(h.db.is_saving());

        h.sched.tick();
        assert!(!h.db.is_saving());
        // Only the flush loop is left.
        assert_eq!(h.sched.pending_tasks(), 1);
    }

    #[test]
    fn progress_timer_runs_while_a_long_queue_drains() {
        let h = harness(config("ns"));
        for i in 0..150 {
            h.db.set(&format!("k{i}"), stacks(1)).unwrap();
        }
        h.sched.run_ticks(u64::from(PROGRESS_INTERVAL_TICKS) + 1);
        assert!(h.db.is_saving());
        assert_eq!(h.sched.pending_tasks(), 2);
        h.flush();
        h.sched.tick();
        assert!(!h.db.is_saving());
    }

    #[test]
    fn shutdown_does_not_flush() {
        let h = harness(config("ns"));
        h.db.set("k", stacks(1)).unwrap();
        h.sched.shutdown();
        h.sched.tick();
        assert_eq!(h.db.queued_len(), 1);
        assert!(!h.world.structure_exists("ns:k").unwrap());
        assert_eq!(h.sched.current_tick(), 1);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn entry() -> impl Strategy<Value = ItemList> {
            proptest::collection::vec(proptest::option::of(1u8..=64), 1..=MAX_ENTRY_ITEMS).prop_map(
                |mut amounts| {
                    // Trailing empty slots are not kept by a snapshot read.
                    if let Some(last) = amounts.last_mut() {
                        last.get_or_insert(1);
                    }
                    amounts
                        .into_iter()
                        .map(|a| a.map(|a| stack("iron_ingot", a)))
                        .collect()
                },
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn entries_round_trip_through_cache_and_snapshot(value in entry()) {
                let h = harness(ItemDatabaseConfig::new("ns").with_cache_size(0));
                h.db.set("k", value.clone()).unwrap();
                prop_assert_eq!(h.db.quick_get("k").unwrap(), Some(value.clone()));

                h.flush();
                h.sched.tick();
                prop_assert!(!h.db.quick_has("k"));
                prop_assert_eq!(h.db.get("k").unwrap(), Some(value));
                prop_assert_eq!(h.world.live_entities(), 0);
            }
        }
    }
}
