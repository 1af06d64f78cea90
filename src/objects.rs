//! Object lifecycle: register, destroy, lookup
//!
//! Registering resolves the instance pointer to a (region id, offset) pair,
//! allocates a directory entry, and publishes it Alive with release
//! ordering. Destroyed entries stay in the directory for the rest of the
//! session; observers filter on state.

use std::{
    collections::HashMap,
    ptr::NonNull,
    sync::{atomic::Ordering, Arc, Mutex},
};

use tracing::debug;

use crate::{
    error::{MemglassError, Result},
    header::HeaderRegion,
    layout::{ObjectEntry, ObjectState},
    metadata::MetadataManager,
    regions::RegionManager,
};

/// Snapshot of one object directory entry
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub label: String,
    pub type_id: u32,
    pub region_id: u64,
    pub offset: u64,
    pub generation: u32,
    pub state: ObjectState,
}

/// Producer-side tracker of live object instances
pub struct ObjectManager {
    header: Arc<HeaderRegion>,
    regions: Arc<RegionManager>,
    metadata: Arc<MetadataManager>,
    entries: Mutex<HashMap<usize, NonNull<ObjectEntry>>>,
}

unsafe impl Send for ObjectManager {}
unsafe impl Sync for ObjectManager {}

impl ObjectManager {
    pub fn new(
        header: Arc<HeaderRegion>,
        regions: Arc<RegionManager>,
        metadata: Arc<MetadataManager>,
    ) -> Self {
        Self {
            header,
            regions,
            metadata,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a live instance at `ptr` under `label`
    pub fn register_object(&self, ptr: NonNull<u8>, type_id: u32, label: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();

        let (region_id, offset) = self
            .regions
            .get_location(ptr.as_ptr())
            .ok_or_else(|| {
                MemglassError::invalid_object("Pointer is not inside any data region")
            })?;

        let slot = self
            .metadata
            .allocate_object_entry(ObjectEntry::new(type_id, region_id, offset, label))?;

        // Entry fields are fully written; flip to Alive with release so an
        // observer that sees Alive sees them all
        unsafe { slot.ptr.as_ref() }
            .state
            .store(ObjectState::Alive as u32, Ordering::Release);
        self.header.bump_sequence();

        entries.insert(ptr.as_ptr() as usize, slot.ptr);
        debug!(label, type_id, region_id, offset, "registered object");
        Ok(())
    }

    /// Mark the instance at `ptr` destroyed
    pub fn destroy_object(&self, ptr: NonNull<u8>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.remove(&(ptr.as_ptr() as usize)).ok_or_else(|| {
            MemglassError::invalid_object("Pointer does not name a registered object")
        })?;

        unsafe { entry.as_ref() }
            .state
            .store(ObjectState::Destroyed as u32, Ordering::Release);
        self.header.bump_sequence();
        debug!(label = unsafe { entry.as_ref() }.label(), "destroyed object");
        Ok(())
    }

    /// Find the first Alive entry with a matching label
    pub fn find_object(&self, label: &str) -> Option<ObjectRecord> {
        self.metadata
            .object_slots()
            .into_iter()
            .map(|slot| unsafe { &*slot.as_ptr() })
            .find(|entry| entry.state() == ObjectState::Alive && entry.label() == label)
            .map(Self::snapshot)
    }

    /// Every Alive entry, header directory first then the overflow chain
    pub fn get_all_objects(&self) -> Vec<ObjectRecord> {
        self.metadata
            .object_slots()
            .into_iter()
            .map(|slot| unsafe { &*slot.as_ptr() })
            .filter(|entry| entry.state() == ObjectState::Alive)
            .map(Self::snapshot)
            .collect()
    }

    fn snapshot(entry: &ObjectEntry) -> ObjectRecord {
        ObjectRecord {
            label: entry.label().to_string(),
            type_id: entry.type_id,
            region_id: entry.region_id,
            offset: entry.offset,
            generation: entry.generation,
            state: entry.state(),
        }
    }
}
