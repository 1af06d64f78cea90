//! Producer-side owner of the mapped session header region
//!
//! The header region starts with the [`SessionHeader`] record; the type,
//! field, and object directories follow inside the same region at the
//! offsets recorded in their descriptors.

use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::Ordering;

use crate::{
    error::{MemglassError, Result},
    layout::{
        align_up, DirectoryDescriptor, FieldEntry, ObjectEntry, SessionHeader, TypeEntry,
    },
    shm::{self, ShmRegion},
};

/// In-header directory offsets derived from the configured capacities
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderLayout {
    pub type_offset: usize,
    pub field_offset: usize,
    pub object_offset: usize,
    pub total: usize,
}

impl HeaderLayout {
    pub fn compute(type_capacity: u32, field_capacity: u32, object_capacity: u32) -> Self {
        let type_offset = align_up(size_of::<SessionHeader>(), 8);
        let field_offset = type_offset + type_capacity as usize * size_of::<TypeEntry>();
        let object_offset = field_offset + field_capacity as usize * size_of::<FieldEntry>();
        let total = object_offset + object_capacity as usize * size_of::<ObjectEntry>();
        Self {
            type_offset,
            field_offset,
            object_offset,
            total,
        }
    }
}

/// The mapped header region, owned by the producer session
#[derive(Debug)]
pub struct HeaderRegion {
    shm: ShmRegion,
}

impl HeaderRegion {
    /// Create the header region and write the initial [`SessionHeader`]
    /// with its three empty directories
    pub fn create(
        dir: &Path,
        session: &str,
        header_size: usize,
        type_capacity: u32,
        field_capacity: u32,
        object_capacity: u32,
    ) -> Result<Self> {
        let layout = HeaderLayout::compute(type_capacity, field_capacity, object_capacity);
        if layout.total > header_size {
            return Err(MemglassError::invalid_parameter(
                "header_size",
                format!(
                    "Directories need {} bytes but the header region is {}",
                    layout.total, header_size
                ),
            ));
        }

        let shm = ShmRegion::create(dir, &shm::header_name(session), header_size)?;

        let header = SessionHeader::new(
            session,
            DirectoryDescriptor::new(layout.type_offset as u32, type_capacity),
            DirectoryDescriptor::new(layout.field_offset as u32, field_capacity),
            DirectoryDescriptor::new(layout.object_offset as u32, object_capacity),
        );
        // The mapping is zero-filled; the directory arrays need no init
        unsafe {
            std::ptr::write(shm.as_mut_ptr() as *mut SessionHeader, header);
        }

        Ok(Self { shm })
    }

    pub fn header(&self) -> &SessionHeader {
        unsafe { &*(self.shm.as_ptr() as *const SessionHeader) }
    }

    /// Current sequence value (acquire)
    pub fn sequence(&self) -> u64 {
        self.header().sequence()
    }

    /// Publish a structural change
    pub fn bump_sequence(&self) -> u64 {
        self.header().bump_sequence()
    }

    pub fn shm(&self) -> &ShmRegion {
        &self.shm
    }

    /// Publish the first data region id (release)
    pub fn set_first_region_id(&self, id: u64) {
        self.header().first_region_id.store(id, Ordering::Release);
    }

    /// Publish the first overflow region id (release)
    pub fn set_first_overflow_id(&self, id: u64) {
        self.header().first_overflow_id.store(id, Ordering::Release);
    }

    /// Pointer to the type entry at `index` in the header directory
    pub(crate) fn type_entry_ptr(&self, index: u32) -> *mut TypeEntry {
        let dir = &self.header().type_dir;
        debug_assert!(index < dir.capacity);
        unsafe {
            (self.shm.as_mut_ptr().add(dir.offset as usize) as *mut TypeEntry).add(index as usize)
        }
    }

    /// Pointer to the field entry at `index` in the header directory
    pub(crate) fn field_entry_ptr(&self, index: u32) -> *mut FieldEntry {
        let dir = &self.header().field_dir;
        debug_assert!(index < dir.capacity);
        unsafe {
            (self.shm.as_mut_ptr().add(dir.offset as usize) as *mut FieldEntry).add(index as usize)
        }
    }

    /// Pointer to the object entry at `index` in the header directory
    pub(crate) fn object_entry_ptr(&self, index: u32) -> *mut ObjectEntry {
        let dir = &self.header().object_dir;
        debug_assert!(index < dir.capacity);
        unsafe {
            (self.shm.as_mut_ptr().add(dir.offset as usize) as *mut ObjectEntry).add(index as usize)
        }
    }
}
