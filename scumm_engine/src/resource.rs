//! Resource cache sitting between the interpreter and the game data.
//!
//! Each cached resource carries a usage counter (lower 7 bits) and a lock
//! bit. Counters age on every allocation; the oldest unlocked resource that
//! nobody else holds a reference to is evicted first.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Script,
    Sound,
    Costume,
    Room,
    Image,
    Charset,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Script,
        ResourceType::Sound,
        ResourceType::Costume,
        ResourceType::Room,
        ResourceType::Image,
        ResourceType::Charset,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            ResourceType::Script => "scripts",
            ResourceType::Sound => "sounds",
            ResourceType::Costume => "costumes",
            ResourceType::Room => "rooms",
            ResourceType::Image => "images",
            ResourceType::Charset => "charsets",
        }
    }
}

pub const RF_LOCK: u8 = 0x80;
pub const RF_USAGE: u8 = 0x7f;
pub const RF_USAGE_MAX: u8 = RF_USAGE;

/// Everything the interpreter needs from resource storage.
pub trait ResourceManager {
    /// Bytes of a resource, loading it on demand. Marks it as just used.
    fn get(&mut self, kind: ResourceType, id: i32) -> Result<Rc<[u8]>>;
    fn is_loaded(&self, kind: ResourceType, id: i32) -> bool;
    fn size(&mut self, kind: ResourceType, id: i32) -> Result<usize>;
    fn lock(&mut self, kind: ResourceType, id: i32);
    fn unlock(&mut self, kind: ResourceType, id: i32);
    fn is_locked(&self, kind: ResourceType, id: i32) -> bool;
    fn nuke(&mut self, kind: ResourceType, id: i32);
    /// Mark a resource as the first candidate for eviction without
    /// dropping it yet.
    fn set_usage(&mut self, kind: ResourceType, id: i32, counter: u8);
    fn set_modified(&mut self, kind: ResourceType, id: i32);
    /// Install bytes created at runtime, replacing any cached copy.
    fn insert(&mut self, kind: ResourceType, id: i32, data: Vec<u8>);
    /// Drop every unlocked resource no one is using.
    fn clear_heap(&mut self);
}

/// Backing store the cache pulls from on a miss.
pub trait ResourceLoader {
    fn load(&mut self, kind: ResourceType, id: i32) -> Result<Option<Vec<u8>>>;
}

/// In-memory backing store, used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    entries: HashMap<(ResourceType, i32), Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceType, id: i32, data: Vec<u8>) {
        self.entries.insert((kind, id), data);
    }

    pub fn with(mut self, kind: ResourceType, id: i32, data: Vec<u8>) -> Self {
        self.insert(kind, id, data);
        self
    }
}

impl ResourceLoader for MemoryLoader {
    fn load(&mut self, kind: ResourceType, id: i32) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&(kind, id)).cloned())
    }
}

/// Reads `<root>/<kind>/<id>.bin`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirectoryLoader {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, kind: ResourceType, id: i32) -> PathBuf {
        self.root.join(kind.dir_name()).join(format!("{id}.bin"))
    }
}

impl ResourceLoader for DirectoryLoader {
    fn load(&mut self, kind: ResourceType, id: i32) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(kind, id);
        if !path.is_file() {
            return Ok(None);
        }
        let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(data))
    }
}

/// Tries each loader in turn; the first one that knows the resource wins.
#[derive(Default)]
pub struct LayeredLoader {
    layers: Vec<Box<dyn ResourceLoader>>,
}

impl LayeredLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loader: Box<dyn ResourceLoader>) {
        self.layers.push(loader);
    }
}

impl ResourceLoader for LayeredLoader {
    fn load(&mut self, kind: ResourceType, id: i32) -> Result<Option<Vec<u8>>> {
        for layer in &mut self.layers {
            if let Some(data) = layer.load(kind, id)? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }
}

#[derive(Debug)]
struct Entry {
    data: Rc<[u8]>,
    flags: u8,
    modified: bool,
}

impl Entry {
    fn counter(&self) -> u8 {
        self.flags & RF_USAGE
    }

    fn set_counter(&mut self, counter: u8) {
        self.flags = (self.flags & RF_LOCK) | (counter & RF_USAGE);
    }

    fn locked(&self) -> bool {
        self.flags & RF_LOCK != 0
    }

    fn in_use(&self) -> bool {
        Rc::strong_count(&self.data) > 1
    }
}

/// Heap limits for [`ResourceCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapLimits {
    /// Eviction stops once the heap is at or below this size.
    pub min: usize,
    /// Eviction starts when an allocation would exceed this size.
    pub max: usize,
}

impl Default for HeapLimits {
    fn default() -> Self {
        HeapLimits {
            min: 4 << 20,
            max: 6 << 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub resident: usize,
    pub allocated: usize,
    pub evictions: usize,
}

pub struct ResourceCache {
    loader: Box<dyn ResourceLoader>,
    entries: BTreeMap<(ResourceType, i32), Entry>,
    limits: HeapLimits,
    allocated: usize,
    evictions: usize,
}

impl ResourceCache {
    pub fn new(loader: Box<dyn ResourceLoader>, limits: HeapLimits) -> Self {
        ResourceCache {
            loader,
            entries: BTreeMap::new(),
            limits,
            allocated: 0,
            evictions: 0,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident: self.entries.len(),
            allocated: self.allocated,
            evictions: self.evictions,
        }
    }

    pub fn usage(&self, kind: ResourceType, id: i32) -> Option<u8> {
        self.entries.get(&(kind, id)).map(Entry::counter)
    }

    fn increase_counters(&mut self) {
        for entry in self.entries.values_mut() {
            let counter = entry.counter();
            if counter != 0 && counter < RF_USAGE_MAX {
                entry.set_counter(counter + 1);
            }
        }
    }

    /// Make room for `size` more bytes.
    fn expire(&mut self, size: usize) {
        self.increase_counters();
        if self.allocated + size <= self.limits.max {
            return;
        }

        while self.allocated + size > self.limits.min {
            let victim = self
                .entries
                .iter()
                .filter(|(_, entry)| !entry.locked() && !entry.in_use() && entry.counter() >= 2)
                .max_by_key(|(_, entry)| entry.counter())
                .map(|(key, _)| *key);
            let Some((kind, id)) = victim else {
                debug!(
                    "resource heap at {} bytes, nothing left to expire",
                    self.allocated
                );
                break;
            };
            trace!("expiring {kind:?} {id}");
            self.remove(kind, id);
            self.evictions += 1;
        }
    }

    fn remove(&mut self, kind: ResourceType, id: i32) {
        if let Some(entry) = self.entries.remove(&(kind, id)) {
            self.allocated -= entry.data.len();
        }
    }

    fn install(&mut self, kind: ResourceType, id: i32, data: Vec<u8>) -> Rc<[u8]> {
        self.remove(kind, id);
        self.expire(data.len());
        self.allocated += data.len();
        let data: Rc<[u8]> = Rc::from(data);
        self.entries.insert(
            (kind, id),
            Entry {
                data: Rc::clone(&data),
                flags: 1,
                modified: false,
            },
        );
        data
    }
}

impl ResourceManager for ResourceCache {
    fn get(&mut self, kind: ResourceType, id: i32) -> Result<Rc<[u8]>> {
        if let Some(entry) = self.entries.get_mut(&(kind, id)) {
            entry.set_counter(1);
            return Ok(Rc::clone(&entry.data));
        }
        let data = self
            .loader
            .load(kind, id)
            .with_context(|| format!("loading {kind:?} {id}"))?
            .with_context(|| format!("{kind:?} {id} does not exist"))?;
        debug!("loaded {kind:?} {id} ({} bytes)", data.len());
        Ok(self.install(kind, id, data))
    }

    fn is_loaded(&self, kind: ResourceType, id: i32) -> bool {
        self.entries.contains_key(&(kind, id))
    }

    fn size(&mut self, kind: ResourceType, id: i32) -> Result<usize> {
        Ok(self.get(kind, id)?.len())
    }

    fn lock(&mut self, kind: ResourceType, id: i32) {
        if let Some(entry) = self.entries.get_mut(&(kind, id)) {
            entry.flags |= RF_LOCK;
        }
    }

    fn unlock(&mut self, kind: ResourceType, id: i32) {
        if let Some(entry) = self.entries.get_mut(&(kind, id)) {
            entry.flags &= !RF_LOCK;
        }
    }

    fn is_locked(&self, kind: ResourceType, id: i32) -> bool {
        self.entries
            .get(&(kind, id))
            .map(Entry::locked)
            .unwrap_or(false)
    }

    fn nuke(&mut self, kind: ResourceType, id: i32) {
        self.remove(kind, id);
    }

    fn set_usage(&mut self, kind: ResourceType, id: i32, counter: u8) {
        if let Some(entry) = self.entries.get_mut(&(kind, id)) {
            entry.set_counter(counter);
        }
    }

    fn set_modified(&mut self, kind: ResourceType, id: i32) {
        if let Some(entry) = self.entries.get_mut(&(kind, id)) {
            entry.modified = true;
        }
    }

    fn insert(&mut self, kind: ResourceType, id: i32, data: Vec<u8>) {
        self.install(kind, id, data);
        self.set_modified(kind, id);
    }

    fn clear_heap(&mut self) {
        let victims: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.locked() && !entry.in_use())
            .map(|(key, _)| *key)
            .collect();
        for (kind, id) in victims {
            self.remove(kind, id);
        }
    }
}
