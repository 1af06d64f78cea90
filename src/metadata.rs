//! Metadata directories and overflow regions
//!
//! Type, field, and object entries live in fixed-capacity directories inside
//! the session header. When a directory fills up, entries spill into
//! metadata overflow regions chained by id; each overflow region carries its
//! own object/type/field sections split by a fixed byte share.
//!
//! Entries are written before the owning count is release-stored, so an
//! observer that reads `count == N` may safely read slots `[0, N)`.

use std::{
    mem::size_of,
    path::{Path, PathBuf},
    ptr::NonNull,
    sync::{atomic::Ordering, Arc, Mutex},
};

use tracing::debug;

use crate::{
    error::{MemglassError, Result},
    header::HeaderRegion,
    layout::{
        FieldEntry, ObjectEntry, OverflowDescriptor, SectionDescriptor, TypeEntry,
        OVERFLOW_FIELD_SHARE, OVERFLOW_OBJECT_SHARE, OVERFLOW_TYPE_SHARE,
    },
    shm::{self, ShmRegion},
};

/// Store id designating the header directories (as opposed to an overflow
/// region id)
pub const HEADER_STORE: u64 = 0;

/// Location of an allocated metadata slot
#[derive(Debug, Clone, Copy)]
pub struct EntrySlot {
    /// [`HEADER_STORE`] or the overflow region id
    pub store: u64,
    /// Index within that store's section
    pub index: u32,
}

/// Location of a contiguous run of field entries; the run never straddles
/// two backing stores
#[derive(Debug, Clone, Copy)]
pub struct FieldRun {
    pub store: u64,
    pub first: u32,
}

/// A published object slot, kept by the producer for later destroy
#[derive(Debug, Clone, Copy)]
pub struct ObjectSlot {
    pub store: u64,
    pub index: u32,
    pub ptr: NonNull<ObjectEntry>,
}

struct OverflowRegion {
    id: u64,
    shm: ShmRegion,
}

impl OverflowRegion {
    fn descriptor(&self) -> &OverflowDescriptor {
        unsafe { &*(self.shm.as_ptr() as *const OverflowDescriptor) }
    }

    fn object_ptr(&self, index: u32) -> *mut ObjectEntry {
        let desc = self.descriptor();
        unsafe {
            (self.shm.as_mut_ptr().add(desc.objects.offset as usize) as *mut ObjectEntry)
                .add(index as usize)
        }
    }

    fn type_ptr(&self, index: u32) -> *mut TypeEntry {
        let desc = self.descriptor();
        unsafe {
            (self.shm.as_mut_ptr().add(desc.types.offset as usize) as *mut TypeEntry)
                .add(index as usize)
        }
    }

    fn field_ptr(&self, index: u32) -> *mut FieldEntry {
        let desc = self.descriptor();
        unsafe {
            (self.shm.as_mut_ptr().add(desc.fields.offset as usize) as *mut FieldEntry)
                .add(index as usize)
        }
    }
}

struct OverflowList {
    regions: Vec<OverflowRegion>,
    next_id: u64,
}

/// Section capacities derived from an overflow region size
#[derive(Debug, Clone, Copy)]
pub(crate) struct OverflowCapacities {
    pub objects: u32,
    pub types: u32,
    pub fields: u32,
}

impl OverflowCapacities {
    pub fn compute(region_size: usize) -> Result<Self> {
        let header_size = size_of::<OverflowDescriptor>();
        let available = region_size.saturating_sub(header_size);

        let objects = (available * OVERFLOW_OBJECT_SHARE / 100) / size_of::<ObjectEntry>();
        let types = (available * OVERFLOW_TYPE_SHARE / 100) / size_of::<TypeEntry>();
        let fields = (available * OVERFLOW_FIELD_SHARE / 100) / size_of::<FieldEntry>();

        if objects == 0 || types == 0 || fields == 0 {
            return Err(MemglassError::invalid_parameter(
                "overflow_region_size",
                "Overflow region too small for all three sections",
            ));
        }
        Ok(Self {
            objects: objects as u32,
            types: types as u32,
            fields: fields as u32,
        })
    }
}

/// Manager for metadata slot allocation across the header and the overflow
/// chain
pub struct MetadataManager {
    header: Arc<HeaderRegion>,
    session: String,
    dir: PathBuf,
    overflow_region_size: usize,
    inner: Mutex<OverflowList>,
}

unsafe impl Send for MetadataManager {}
unsafe impl Sync for MetadataManager {}

impl MetadataManager {
    /// Create the manager; overflow region creation is deferred until a
    /// header directory fills up
    pub fn new(
        header: Arc<HeaderRegion>,
        session: &str,
        dir: &Path,
        overflow_region_size: usize,
    ) -> Result<Self> {
        // Fail early if the configured size could never host a section
        OverflowCapacities::compute(overflow_region_size)?;

        Ok(Self {
            header,
            session: session.to_string(),
            dir: dir.to_path_buf(),
            overflow_region_size,
            inner: Mutex::new(OverflowList {
                regions: Vec::new(),
                next_id: 1,
            }),
        })
    }

    /// Field capacity of a single overflow region at this configuration; a
    /// larger field run can never be satisfied
    pub fn max_field_run(&self) -> u32 {
        OverflowCapacities::compute(self.overflow_region_size)
            .map(|c| c.fields)
            .unwrap_or(0)
    }

    fn create_overflow_region(&self, inner: &mut OverflowList) -> Result<()> {
        let id = inner.next_id;
        let shm_name = shm::meta_name(&self.session, id);
        let caps = OverflowCapacities::compute(self.overflow_region_size)?;

        let header_size = size_of::<OverflowDescriptor>();
        let object_bytes = caps.objects as usize * size_of::<ObjectEntry>();
        let type_bytes = caps.types as usize * size_of::<TypeEntry>();
        let field_bytes = caps.fields as usize * size_of::<FieldEntry>();
        let total = header_size + object_bytes + type_bytes + field_bytes;

        let region = OverflowRegion {
            id,
            shm: ShmRegion::create(&self.dir, &shm_name, total)?,
        };
        unsafe {
            std::ptr::write(
                region.shm.as_mut_ptr() as *mut OverflowDescriptor,
                OverflowDescriptor::new(
                    id,
                    SectionDescriptor::new(header_size as u32, caps.objects),
                    SectionDescriptor::new((header_size + object_bytes) as u32, caps.types),
                    SectionDescriptor::new(
                        (header_size + object_bytes + type_bytes) as u32,
                        caps.fields,
                    ),
                    &shm_name,
                ),
            );
        }

        if let Some(prev) = inner.regions.last() {
            prev.descriptor()
                .next_region_id
                .store(id, Ordering::Release);
        } else {
            self.header.set_first_overflow_id(id);
        }

        debug!(
            overflow_id = id,
            objects = caps.objects,
            types = caps.types,
            fields = caps.fields,
            "created metadata overflow region"
        );

        inner.next_id += 1;
        inner.regions.push(region);
        self.header.bump_sequence();
        Ok(())
    }

    /// Allocate and publish a type entry slot
    pub fn allocate_type_entry(&self, entry: TypeEntry) -> Result<EntrySlot> {
        let mut inner = self.inner.lock().unwrap();

        let dir = &self.header.header().type_dir;
        let count = dir.count.load(Ordering::Acquire);
        if count < dir.capacity {
            unsafe { std::ptr::write(self.header.type_entry_ptr(count), entry) };
            dir.count.store(count + 1, Ordering::Release);
            return Ok(EntrySlot {
                store: HEADER_STORE,
                index: count,
            });
        }

        let tail_full = match inner.regions.last() {
            None => true,
            Some(tail) => {
                let section = &tail.descriptor().types;
                section.count.load(Ordering::Acquire) >= section.capacity
            }
        };
        if tail_full {
            self.create_overflow_region(&mut inner)?;
        }

        let tail = inner.regions.last().unwrap();
        let section = &tail.descriptor().types;
        let count = section.count.load(Ordering::Acquire);
        unsafe { std::ptr::write(tail.type_ptr(count), entry) };
        section.count.store(count + 1, Ordering::Release);
        Ok(EntrySlot {
            store: tail.id,
            index: count,
        })
    }

    /// Allocate and publish a contiguous run of field entries from a single
    /// backing store
    pub fn allocate_field_entries(&self, entries: &[FieldEntry]) -> Result<FieldRun> {
        let n = entries.len() as u32;
        if n == 0 {
            return Err(MemglassError::invalid_parameter(
                "fields",
                "Field run must be non-empty",
            ));
        }

        let mut inner = self.inner.lock().unwrap();

        let dir = &self.header.header().field_dir;
        let count = dir.count.load(Ordering::Acquire);
        if count + n <= dir.capacity {
            for (i, entry) in entries.iter().enumerate() {
                unsafe {
                    std::ptr::write(self.header.field_entry_ptr(count + i as u32), entry.clone())
                };
            }
            dir.count.store(count + n, Ordering::Release);
            return Ok(FieldRun {
                store: HEADER_STORE,
                first: count,
            });
        }

        // A run larger than any single overflow region can never succeed
        let per_region = self.max_field_run();
        if n > per_region {
            return Err(MemglassError::out_of_space(
                entries.len() * size_of::<FieldEntry>(),
                per_region as usize * size_of::<FieldEntry>(),
            ));
        }

        let tail_full = match inner.regions.last() {
            None => true,
            Some(tail) => {
                let section = &tail.descriptor().fields;
                section.count.load(Ordering::Acquire) + n > section.capacity
            }
        };
        if tail_full {
            self.create_overflow_region(&mut inner)?;
        }

        let tail = inner.regions.last().unwrap();
        let section = &tail.descriptor().fields;
        let count = section.count.load(Ordering::Acquire);
        for (i, entry) in entries.iter().enumerate() {
            unsafe { std::ptr::write(tail.field_ptr(count + i as u32), entry.clone()) };
        }
        section.count.store(count + n, Ordering::Release);
        Ok(FieldRun {
            store: tail.id,
            first: count,
        })
    }

    /// Allocate and publish an object entry slot; the entry is written in
    /// the Free state, the caller release-stores Alive once satisfied
    pub fn allocate_object_entry(&self, entry: ObjectEntry) -> Result<ObjectSlot> {
        let mut inner = self.inner.lock().unwrap();

        let dir = &self.header.header().object_dir;
        let count = dir.count.load(Ordering::Acquire);
        if count < dir.capacity {
            let ptr = self.header.object_entry_ptr(count);
            unsafe { std::ptr::write(ptr, entry) };
            dir.count.store(count + 1, Ordering::Release);
            return Ok(ObjectSlot {
                store: HEADER_STORE,
                index: count,
                ptr: unsafe { NonNull::new_unchecked(ptr) },
            });
        }

        let tail_full = match inner.regions.last() {
            None => true,
            Some(tail) => {
                let section = &tail.descriptor().objects;
                section.count.load(Ordering::Acquire) >= section.capacity
            }
        };
        if tail_full {
            self.create_overflow_region(&mut inner)?;
        }

        let tail = inner.regions.last().unwrap();
        let section = &tail.descriptor().objects;
        let count = section.count.load(Ordering::Acquire);
        let ptr = tail.object_ptr(count);
        unsafe { std::ptr::write(ptr, entry) };
        section.count.store(count + 1, Ordering::Release);
        Ok(ObjectSlot {
            store: tail.id,
            index: count,
            ptr: unsafe { NonNull::new_unchecked(ptr) },
        })
    }

    /// Total type count across the header directory and the overflow chain
    pub fn total_type_count(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        let mut total = self.header.header().type_dir.count();
        for region in &inner.regions {
            total += region.descriptor().types.count();
        }
        total
    }

    /// Total field count across the header directory and the overflow chain
    pub fn total_field_count(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        let mut total = self.header.header().field_dir.count();
        for region in &inner.regions {
            total += region.descriptor().fields.count();
        }
        total
    }

    /// Total object count across the header directory and the overflow chain
    pub fn total_object_count(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        let mut total = self.header.header().object_dir.count();
        for region in &inner.regions {
            total += region.descriptor().objects.count();
        }
        total
    }

    /// Pointers to every published object slot, header first then overflow
    /// in chain order
    pub fn object_slots(&self) -> Vec<NonNull<ObjectEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut slots = Vec::new();

        let dir = &self.header.header().object_dir;
        for i in 0..dir.count() {
            slots.push(unsafe { NonNull::new_unchecked(self.header.object_entry_ptr(i)) });
        }
        for region in &inner.regions {
            for i in 0..region.descriptor().objects.count() {
                slots.push(unsafe { NonNull::new_unchecked(region.object_ptr(i)) });
            }
        }
        slots
    }

    /// Shared-memory names of every overflow region, for shutdown unlinking
    pub fn shm_names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .regions
            .iter()
            .map(|r| r.shm.name().to_string())
            .collect()
    }
}
