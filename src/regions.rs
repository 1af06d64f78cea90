//! Data region chain and bump allocation for user objects
//!
//! The region manager owns an ordered chain of mapped data regions. Each
//! region starts with a [`RegionDescriptor`]; user bytes are bump-allocated
//! behind it and never reissued. When the tail region cannot satisfy a
//! request, a new region is created with geometric growth, stitched into the
//! chain, and published through the session sequence.

use std::{
    mem::size_of,
    path::{Path, PathBuf},
    ptr::NonNull,
    sync::{Arc, Mutex},
};

use tracing::{debug, trace};

use crate::{
    error::{MemglassError, Result},
    header::HeaderRegion,
    layout::{align_up, RegionDescriptor},
    shm::{self, ShmRegion},
};

/// Point-in-time usage of one data region
#[derive(Debug, Clone, Copy)]
pub struct RegionStats {
    pub id: u64,
    /// Total size in bytes, descriptor included
    pub size: u64,
    /// Current allocation watermark
    pub used: u64,
}

struct DataRegion {
    id: u64,
    shm: ShmRegion,
}

impl DataRegion {
    fn descriptor(&self) -> &RegionDescriptor {
        unsafe { &*(self.shm.as_ptr() as *const RegionDescriptor) }
    }

    fn base(&self) -> *mut u8 {
        unsafe { self.shm.as_mut_ptr() }
    }
}

struct RegionList {
    regions: Vec<DataRegion>,
    next_id: u64,
    /// Payload size of the most recently created region, doubled on growth
    current_size: usize,
}

/// Manager for the session's chain of data regions
pub struct RegionManager {
    header: Arc<HeaderRegion>,
    session: String,
    dir: PathBuf,
    max_size: usize,
    inner: Mutex<RegionList>,
}

unsafe impl Send for RegionManager {}
unsafe impl Sync for RegionManager {}

impl RegionManager {
    /// Create the manager and its first data region, publishing the region
    /// id into the session header
    pub fn new(
        header: Arc<HeaderRegion>,
        session: &str,
        dir: &Path,
        initial_size: usize,
        max_size: usize,
    ) -> Result<Self> {
        if initial_size == 0 || max_size < initial_size {
            return Err(MemglassError::invalid_parameter(
                "initial_region_size",
                "Region sizes must satisfy 0 < initial <= max",
            ));
        }

        let manager = Self {
            header,
            session: session.to_string(),
            dir: dir.to_path_buf(),
            max_size,
            inner: Mutex::new(RegionList {
                regions: Vec::new(),
                next_id: 1,
                current_size: initial_size,
            }),
        };

        {
            let mut inner = manager.inner.lock().unwrap();
            let first_id = Self::create_region(&manager.session, &manager.dir, &mut inner, initial_size)?;
            manager.header.set_first_region_id(first_id);
        }

        Ok(manager)
    }

    /// Create a region with `payload_size` usable bytes and stitch it onto
    /// the chain tail. Returns the new region id.
    fn create_region(
        session: &str,
        dir: &Path,
        inner: &mut RegionList,
        payload_size: usize,
    ) -> Result<u64> {
        let id = inner.next_id;
        let shm_name = shm::region_name(session, id);
        let total_size = size_of::<RegionDescriptor>() + payload_size;

        let region = DataRegion {
            id,
            shm: ShmRegion::create(dir, &shm_name, total_size)?,
        };
        unsafe {
            std::ptr::write(
                region.base() as *mut RegionDescriptor,
                RegionDescriptor::new(id, total_size as u64, &shm_name),
            );
        }

        if let Some(prev) = inner.regions.last() {
            prev.descriptor()
                .next_region_id
                .store(id, std::sync::atomic::Ordering::Release);
        }

        debug!(region_id = id, size = total_size, name = %shm_name, "created data region");

        inner.next_id += 1;
        inner.regions.push(region);
        Ok(id)
    }

    /// Bump-allocate `size` bytes at `align` from the tail region, growing
    /// the chain when the tail is exhausted
    pub fn allocate(&self, size: usize, align: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(MemglassError::invalid_parameter(
                "size",
                "Size must be greater than 0",
            ));
        }
        if align == 0 || !align.is_power_of_two() {
            return Err(MemglassError::invalid_parameter(
                "align",
                "Alignment must be a power of 2",
            ));
        }

        let mut inner = self.inner.lock().unwrap();

        loop {
            let region = inner.regions.last().ok_or_else(|| {
                MemglassError::invalid_parameter("regions", "Region manager not initialized")
            })?;
            let desc = region.descriptor();

            let used = desc.used.load(std::sync::atomic::Ordering::Acquire) as usize;
            let aligned = align_up(used, align);
            let new_used = aligned + size;

            if new_used <= desc.size as usize {
                desc.used
                    .store(new_used as u64, std::sync::atomic::Ordering::Release);
                trace!(region_id = region.id, offset = aligned, size, "allocated");
                let ptr = unsafe { region.base().add(aligned) };
                return Ok(unsafe { NonNull::new_unchecked(ptr) });
            }

            // Tail exhausted: negotiate the next region size. A request that
            // cannot fit even a max-size region fails before anything is
            // created.
            let needed = align_up(size_of::<RegionDescriptor>(), align) + size
                - size_of::<RegionDescriptor>();
            if needed > self.max_size {
                return Err(MemglassError::out_of_space(size, self.max_size));
            }
            let doubled = inner.current_size.saturating_mul(2).min(self.max_size);
            let payload = doubled.max(needed);
            inner.current_size = payload;

            Self::create_region(&self.session, &self.dir, &mut inner, payload)?;
            self.header.bump_sequence();
        }
    }

    /// Resolve a pointer to its (region id, byte offset) location
    pub fn get_location(&self, ptr: *const u8) -> Option<(u64, u64)> {
        let inner = self.inner.lock().unwrap();
        for region in &inner.regions {
            if region.shm.contains(ptr) {
                let offset = ptr as usize - region.base() as usize;
                return Some((region.id, offset as u64));
            }
        }
        None
    }

    /// Base address of the region with the given id, if mapped
    pub fn get_region_data(&self, id: u64) -> Option<NonNull<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .regions
            .iter()
            .find(|r| r.id == id)
            .map(|r| unsafe { NonNull::new_unchecked(r.base()) })
    }

    /// Number of regions in the chain
    pub fn region_count(&self) -> usize {
        self.inner.lock().unwrap().regions.len()
    }

    /// Region ids in allocation order
    pub fn region_ids(&self) -> Vec<u64> {
        self.inner.lock().unwrap().regions.iter().map(|r| r.id).collect()
    }

    /// Usage snapshot of every region
    pub fn stats(&self) -> Vec<RegionStats> {
        let inner = self.inner.lock().unwrap();
        inner
            .regions
            .iter()
            .map(|r| {
                let desc = r.descriptor();
                RegionStats {
                    id: r.id,
                    size: desc.size,
                    used: desc.used.load(std::sync::atomic::Ordering::Acquire),
                }
            })
            .collect()
    }

    /// Shared-memory names of every region, for shutdown unlinking
    pub fn shm_names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .regions
            .iter()
            .map(|r| r.shm.name().to_string())
            .collect()
    }
}
