//! Observer: map a session, resolve types and objects, read fields
//!
//! An observer opens the header region by name, validates the protocol, and
//! walks the metadata chains into an in-process index. Field access goes
//! through [`ObjectView`] and [`FieldProxy`], which honor each field's
//! atomicity tag.
//!
//! The canonical polling loop:
//!
//! ```ignore
//! let mut last_seen = 0;
//! loop {
//!     let seq = observer.sequence();
//!     if seq != last_seen {
//!         observer.refresh()?;
//!         last_seen = seq;
//!     }
//!     // ... read fields ...
//! }
//! ```
//!
//! For paranoid consistency of a multi-field read, capture `sequence()`
//! before and after the batch and retry on mismatch.

mod proxy;
mod view;

pub use proxy::{FieldProxy, FieldValue};
pub use view::ObjectView;

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};

use tracing::{debug, warn};

use crate::{
    error::{MemglassError, Result},
    layout::{
        Atomicity, FieldEntry, ObjectEntry, ObjectState, OverflowDescriptor, PrimitiveType,
        RegionDescriptor, SessionHeader, TypeEntry,
    },
    metadata::HEADER_STORE,
    shm::{self, ShmRegion},
};

/// A type as seen by an observer
#[derive(Debug, Clone)]
pub struct ObservedType {
    pub type_id: u32,
    pub name: String,
    pub size: u64,
    pub alignment: u32,
    pub fields: Vec<ObservedField>,
}

impl ObservedType {
    /// Find a field by its full (possibly dotted) name
    pub fn field(&self, name: &str) -> Option<&ObservedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A field descriptor as seen by an observer
#[derive(Debug, Clone)]
pub struct ObservedField {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub type_id: u32,
    pub array_len: u32,
    pub flags: u32,
    pub atomicity: Atomicity,
    pub is_nested: bool,
}

impl ObservedField {
    /// Payload alignment for the wrapper offset contract
    pub fn payload_align(&self) -> usize {
        PrimitiveType::from_type_id(self.type_id)
            .map(|p| p.align() as usize)
            .unwrap_or(8)
    }

    /// Total payload bytes: element size times element count
    pub fn total_size(&self) -> u32 {
        self.size * self.array_len.max(1)
    }
}

/// An object directory entry as seen by an observer
#[derive(Debug, Clone)]
pub struct ObservedObject {
    pub label: String,
    pub type_id: u32,
    pub type_name: String,
    pub region_id: u64,
    pub offset: u64,
    pub generation: u32,
    pub state: ObjectState,
}

/// A connected observer over one session
pub struct Observer {
    session: String,
    dir: PathBuf,
    header: ShmRegion,
    types: Vec<ObservedType>,
    type_index: HashMap<u32, usize>,
    regions: HashMap<u64, ShmRegion>,
    meta: Vec<(u64, ShmRegion)>,
}

impl Observer {
    /// Connect to a session in the default shared-memory directory
    pub fn connect(session: &str) -> Result<Self> {
        Self::connect_in(session, shm::default_shm_dir())
    }

    /// Connect to a session whose region files live under `dir`
    pub fn connect_in(session: &str, dir: impl Into<PathBuf>) -> Result<Self> {
        shm::validate_session_name(session)?;
        let dir = dir.into();

        let header = ShmRegion::open(&dir, &shm::header_name(session)).map_err(|e| {
            MemglassError::session_unavailable(format!(
                "Cannot open header for session '{}': {}",
                session, e
            ))
        })?;
        if header.size() < std::mem::size_of::<SessionHeader>() {
            return Err(MemglassError::session_unavailable(
                "Header region too small for the session header",
            ));
        }

        let mut observer = Self {
            session: session.to_string(),
            dir,
            header,
            types: Vec::new(),
            type_index: HashMap::new(),
            regions: HashMap::new(),
            meta: Vec::new(),
        };

        // Magic/version mismatch drops the mapping with the error
        observer.header().validate()?;
        observer.refresh()?;

        debug!(
            session,
            pid = observer.producer_pid(),
            sequence = observer.sequence(),
            "observer connected"
        );
        Ok(observer)
    }

    fn header(&self) -> &SessionHeader {
        unsafe { &*(self.header.as_ptr() as *const SessionHeader) }
    }

    /// Current session sequence value (acquire)
    pub fn sequence(&self) -> u64 {
        self.header().sequence()
    }

    /// Producer process id
    pub fn producer_pid(&self) -> u32 {
        self.header().producer_pid
    }

    /// Session name
    pub fn session_name(&self) -> &str {
        &self.session
    }

    /// Session start, seconds since the Unix epoch
    pub fn start_timestamp(&self) -> u64 {
        self.header().start_timestamp
    }

    /// Re-run [`Observer::load_regions`] and [`Observer::load_types`] for
    /// any new entries.
    ///
    /// A failure (e.g. a region name that no longer exists) stops the
    /// refresh but leaves already-mapped regions and loaded types valid.
    pub fn refresh(&mut self) -> Result<()> {
        self.load_regions()?;
        self.load_types()
    }

    /// Map any data regions appended since the last load; idempotent for
    /// already-mapped regions
    pub fn load_regions(&mut self) -> Result<()> {
        let mut id = self
            .header()
            .first_region_id
            .load(std::sync::atomic::Ordering::Acquire);
        let mut seen = HashSet::new();

        while id != 0 && seen.insert(id) {
            if !self.regions.contains_key(&id) {
                let name = shm::region_name(&self.session, id);
                let region = match ShmRegion::open(&self.dir, &name) {
                    Ok(region) => region,
                    Err(e) => {
                        warn!(region_id = id, error = %e, "region vanished during refresh");
                        return Err(e);
                    }
                };
                let desc = unsafe { &*(region.as_ptr() as *const RegionDescriptor) };
                desc.validate()?;
                self.regions.insert(id, region);
            }
            let desc =
                unsafe { &*(self.regions[&id].as_ptr() as *const RegionDescriptor) };
            id = desc
                .next_region_id
                .load(std::sync::atomic::Ordering::Acquire);
        }
        Ok(())
    }

    /// Read type and field entries from the header and the overflow chain
    /// into the in-process index; idempotent per type id
    pub fn load_types(&mut self) -> Result<()> {
        self.load_meta_regions()?;

        // Header directory types
        let count = self.header().type_dir.count();
        for index in 0..count {
            let entry = unsafe { self.header_type_ptr(index).read() };
            self.index_type(&entry)?;
        }

        // Overflow chain types
        for position in 0..self.meta.len() {
            let (base, types_offset, count) = {
                let (_, region) = &self.meta[position];
                let desc = unsafe { &*(region.as_ptr() as *const OverflowDescriptor) };
                (
                    region.as_ptr(),
                    desc.types.offset as usize,
                    desc.types.count(),
                )
            };
            for index in 0..count {
                let entry = unsafe {
                    (base.add(types_offset) as *const TypeEntry)
                        .add(index as usize)
                        .read()
                };
                self.index_type(&entry)?;
            }
        }
        Ok(())
    }

    fn load_meta_regions(&mut self) -> Result<()> {
        let mut id = self
            .header()
            .first_overflow_id
            .load(std::sync::atomic::Ordering::Acquire);
        let mut seen = HashSet::new();

        while id != 0 && seen.insert(id) {
            if !self.meta.iter().any(|(mapped, _)| *mapped == id) {
                let name = shm::meta_name(&self.session, id);
                let region = ShmRegion::open(&self.dir, &name)?;
                let desc = unsafe { &*(region.as_ptr() as *const OverflowDescriptor) };
                desc.validate()?;
                self.meta.push((id, region));
            }
            let region = &self
                .meta
                .iter()
                .find(|(mapped, _)| *mapped == id)
                .unwrap()
                .1;
            let desc = unsafe { &*(region.as_ptr() as *const OverflowDescriptor) };
            id = desc
                .next_region_id
                .load(std::sync::atomic::Ordering::Acquire);
        }
        Ok(())
    }

    fn header_type_ptr(&self, index: u32) -> *const TypeEntry {
        let dir = &self.header().type_dir;
        unsafe {
            (self.header.as_ptr().add(dir.offset as usize) as *const TypeEntry)
                .add(index as usize)
        }
    }

    fn header_field_ptr(&self, index: u32) -> *const FieldEntry {
        let dir = &self.header().field_dir;
        unsafe {
            (self.header.as_ptr().add(dir.offset as usize) as *const FieldEntry)
                .add(index as usize)
        }
    }

    /// Resolve a type entry's field run and add the type to the index
    fn index_type(&mut self, entry: &TypeEntry) -> Result<()> {
        if self.type_index.contains_key(&entry.type_id) {
            return Ok(());
        }

        let mut fields = Vec::with_capacity(entry.field_count as usize);
        for i in 0..entry.field_count {
            let field = if entry.field_store == HEADER_STORE {
                unsafe { &*self.header_field_ptr(entry.first_field + i) }
            } else {
                let region = &self
                    .meta
                    .iter()
                    .find(|(id, _)| *id == entry.field_store)
                    .ok_or_else(|| {
                        MemglassError::invalid_field(format!(
                            "Field store {} of type {} is not mapped",
                            entry.field_store,
                            entry.name()
                        ))
                    })?
                    .1;
                let desc = unsafe { &*(region.as_ptr() as *const OverflowDescriptor) };
                unsafe {
                    &*((region.as_ptr().add(desc.fields.offset as usize) as *const FieldEntry)
                        .add((entry.first_field + i) as usize))
                }
            };
            fields.push(ObservedField {
                name: field.name().to_string(),
                offset: field.offset,
                size: field.size,
                type_id: field.type_id,
                array_len: field.array_len,
                flags: field.flags,
                atomicity: field.atomicity(),
                is_nested: field.is_nested != 0,
            });
        }

        let observed = ObservedType {
            type_id: entry.type_id,
            name: entry.name().to_string(),
            size: entry.size,
            alignment: entry.alignment,
            fields,
        };
        self.type_index.insert(entry.type_id, self.types.len());
        self.types.push(observed);
        Ok(())
    }

    /// All loaded types
    pub fn types(&self) -> &[ObservedType] {
        &self.types
    }

    /// Look up a loaded type by id
    pub fn type_by_id(&self, type_id: u32) -> Option<&ObservedType> {
        self.type_index.get(&type_id).map(|&i| &self.types[i])
    }

    /// Look up a loaded type by name
    pub fn type_by_name(&self, name: &str) -> Option<&ObservedType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Ids of the mapped data regions
    pub fn region_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.regions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn object_snapshot(&self, entry: &ObjectEntry) -> ObservedObject {
        ObservedObject {
            label: entry.label().to_string(),
            type_id: entry.type_id,
            type_name: self
                .type_by_id(entry.type_id)
                .map(|t| t.name.clone())
                .unwrap_or_default(),
            region_id: entry.region_id,
            offset: entry.offset,
            generation: entry.generation,
            state: entry.state(),
        }
    }

    fn scan_objects<F: FnMut(&ObjectEntry)>(&self, mut visit: F) {
        let header = self.header();
        let count = header.object_dir.count();
        for index in 0..count {
            let entry = unsafe {
                &*((self.header.as_ptr().add(header.object_dir.offset as usize)
                    as *const ObjectEntry)
                    .add(index as usize))
            };
            visit(entry);
        }
        for (_, region) in &self.meta {
            let desc = unsafe { &*(region.as_ptr() as *const OverflowDescriptor) };
            let count = desc.objects.count();
            for index in 0..count {
                let entry = unsafe {
                    &*((region.as_ptr().add(desc.objects.offset as usize)
                        as *const ObjectEntry)
                        .add(index as usize))
                };
                visit(entry);
            }
        }
    }

    /// Every Alive object
    pub fn objects(&self) -> Vec<ObservedObject> {
        let mut result = Vec::new();
        self.scan_objects(|entry| {
            if entry.state() == ObjectState::Alive {
                result.push(self.object_snapshot(entry));
            }
        });
        result
    }

    /// Every published entry regardless of state, for state-aware callers
    pub fn all_entries(&self) -> Vec<ObservedObject> {
        let mut result = Vec::new();
        self.scan_objects(|entry| {
            if entry.state() != ObjectState::Free {
                result.push(self.object_snapshot(entry));
            }
        });
        result
    }

    /// Find the first Alive object with a matching label
    pub fn find_object(&self, label: &str) -> Option<ObservedObject> {
        self.objects().into_iter().find(|o| o.label == label)
    }

    /// Bind an object view over the instance bytes.
    ///
    /// Fails with [`MemglassError::InvalidObject`] when the object's region
    /// is not mapped (call [`Observer::refresh`] first), or
    /// [`MemglassError::InvalidField`] when its type is unknown.
    pub fn get(&self, object: &ObservedObject) -> Result<ObjectView<'_>> {
        let ty = self.type_by_id(object.type_id).ok_or_else(|| {
            MemglassError::invalid_field(format!("type {:#x}", object.type_id))
        })?;
        let region = self.regions.get(&object.region_id).ok_or_else(|| {
            MemglassError::invalid_object(format!(
                "Region {} is not mapped; refresh the observer",
                object.region_id
            ))
        })?;
        if object.offset + ty.size > region.size() as u64 {
            return Err(MemglassError::invalid_object(format!(
                "Object at {}+{} exceeds region size {}",
                object.offset,
                ty.size,
                region.size()
            )));
        }
        let base = unsafe { region.as_ptr().add(object.offset as usize) };
        Ok(ObjectView::new(base, ty))
    }
}
