//! Producer session: configuration, bootstrap, publication, shutdown
//!
//! The [`Session`] is the producer-side context handle tying together the
//! header region, the data region chain, the metadata manager, the type
//! registry, and the object manager. Every core call goes through an
//! explicit session handle; there is no module-level global.

use std::{
    path::PathBuf,
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::Result,
    header::HeaderRegion,
    metadata::MetadataManager,
    objects::{ObjectManager, ObjectRecord},
    regions::{RegionManager, RegionStats},
    registry::{TypeDescriptor, TypeRegistry},
    shm::{self, ShmRegion},
};

/// Default configuration constants
pub mod defaults {
    /// Default size of the first data region (1 MiB)
    pub const INITIAL_REGION_SIZE: usize = 1024 * 1024;

    /// Default cap for geometric growth of data regions (256 MiB)
    pub const MAX_REGION_SIZE: usize = 256 * 1024 * 1024;

    /// Default size of each metadata overflow region (256 KiB)
    pub const OVERFLOW_REGION_SIZE: usize = 256 * 1024;

    /// Default size of the header region (256 KiB)
    pub const HEADER_SIZE: usize = 256 * 1024;

    /// Default in-header directory capacities
    pub const HEADER_TYPE_CAPACITY: u32 = 128;
    pub const HEADER_FIELD_CAPACITY: u32 = 1024;
    pub const HEADER_OBJECT_CAPACITY: u32 = 512;
}

/// Producer session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Size of the first data region in bytes
    pub initial_region_size: usize,
    /// Cap for geometric growth of new data regions
    pub max_region_size: usize,
    /// Size of each metadata overflow region
    pub overflow_region_size: usize,
    /// Size of the header region; must fit the three directories
    pub header_size: usize,
    /// Type directory capacity inside the header
    pub header_type_capacity: u32,
    /// Field directory capacity inside the header
    pub header_field_capacity: u32,
    /// Object directory capacity inside the header
    pub header_object_capacity: u32,
    /// Region file directory override; defaults to `/dev/shm`
    pub base_dir: Option<PathBuf>,
    /// Grace interval for observers before shutdown unlinks the names
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_region_size: defaults::INITIAL_REGION_SIZE,
            max_region_size: defaults::MAX_REGION_SIZE,
            overflow_region_size: defaults::OVERFLOW_REGION_SIZE,
            header_size: defaults::HEADER_SIZE,
            header_type_capacity: defaults::HEADER_TYPE_CAPACITY,
            header_field_capacity: defaults::HEADER_FIELD_CAPACITY,
            header_object_capacity: defaults::HEADER_OBJECT_CAPACITY,
            base_dir: None,
            shutdown_grace: Duration::ZERO,
        }
    }
}

impl Config {
    pub fn with_initial_region_size(mut self, size: usize) -> Self {
        self.initial_region_size = size;
        self
    }

    pub fn with_max_region_size(mut self, size: usize) -> Self {
        self.max_region_size = size;
        self
    }

    pub fn with_overflow_region_size(mut self, size: usize) -> Self {
        self.overflow_region_size = size;
        self
    }

    pub fn with_header_size(mut self, size: usize) -> Self {
        self.header_size = size;
        self
    }

    pub fn with_header_capacities(mut self, types: u32, fields: u32, objects: u32) -> Self {
        self.header_type_capacity = types;
        self.header_field_capacity = fields;
        self.header_object_capacity = objects;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// A live producer session
pub struct Session {
    name: String,
    dir: PathBuf,
    config: Config,
    header: Arc<HeaderRegion>,
    regions: Arc<RegionManager>,
    metadata: Arc<MetadataManager>,
    registry: TypeRegistry,
    objects: ObjectManager,
    unlinked: AtomicBool,
}

impl Session {
    /// Create and publish a new session under `name`
    pub fn create(name: &str, config: Config) -> Result<Self> {
        shm::validate_session_name(name)?;
        let dir = config
            .base_dir
            .clone()
            .unwrap_or_else(shm::default_shm_dir);

        let header = Arc::new(HeaderRegion::create(
            &dir,
            name,
            config.header_size,
            config.header_type_capacity,
            config.header_field_capacity,
            config.header_object_capacity,
        )?);

        let components = (|| -> Result<(Arc<RegionManager>, Arc<MetadataManager>)> {
            let regions = Arc::new(RegionManager::new(
                header.clone(),
                name,
                &dir,
                config.initial_region_size,
                config.max_region_size,
            )?);
            let metadata = Arc::new(MetadataManager::new(
                header.clone(),
                name,
                &dir,
                config.overflow_region_size,
            )?);
            Ok((regions, metadata))
        })();

        let (regions, metadata) = match components {
            Ok(parts) => parts,
            Err(e) => {
                // Roll back the names already claimed
                let _ = ShmRegion::unlink(&dir, &shm::header_name(name));
                let _ = ShmRegion::unlink(&dir, &shm::region_name(name, 1));
                return Err(e);
            }
        };

        let registry = TypeRegistry::new(header.clone(), metadata.clone());
        let objects = ObjectManager::new(header.clone(), regions.clone(), metadata.clone());

        // Publish the bootstrapped state to observers
        header.bump_sequence();
        info!(session = name, dir = %dir.display(), "session created");

        Ok(Self {
            name: name.to_string(),
            dir,
            config,
            header,
            regions,
            metadata,
            registry,
            objects,
            unlinked: AtomicBool::new(false),
        })
    }

    /// Session name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current sequence value
    pub fn sequence(&self) -> u64 {
        self.header.sequence()
    }

    /// Register a record schema, returning its stable type id
    pub fn register_type(&self, descriptor: &TypeDescriptor) -> Result<u32> {
        self.registry.register(descriptor)
    }

    /// Bump-allocate raw bytes inside a data region
    pub fn allocate_raw(&self, size: usize, align: usize) -> Result<NonNull<u8>> {
        self.regions.allocate(size, align)
    }

    /// Bump-allocate a zeroed, aligned slot for `T`
    ///
    /// Fresh region bytes are zero-filled and never reissued, so the slot
    /// starts as all-zeroes.
    pub fn allocate<T>(&self) -> Result<NonNull<T>> {
        self.regions
            .allocate(std::mem::size_of::<T>(), std::mem::align_of::<T>())
            .map(NonNull::cast)
    }

    /// Allocate, write, and register an instance in one call.
    ///
    /// `T` must be trivially copyable: no drop glue, no references, fixed
    /// layout (`#[repr(C)]`).
    pub fn publish<T>(&self, type_id: u32, label: &str, value: T) -> Result<NonNull<T>> {
        let ptr = self.allocate::<T>()?;
        unsafe { std::ptr::write(ptr.as_ptr(), value) };
        self.register_object(ptr.cast(), type_id, label)?;
        Ok(ptr)
    }

    /// Register a live instance previously allocated from this session
    pub fn register_object(&self, ptr: NonNull<u8>, type_id: u32, label: &str) -> Result<()> {
        self.objects.register_object(ptr, type_id, label)
    }

    /// Mark a registered instance destroyed
    pub fn destroy_object<T>(&self, ptr: NonNull<T>) -> Result<()> {
        self.objects.destroy_object(ptr.cast())
    }

    /// Find the first Alive object with the given label
    pub fn find_object(&self, label: &str) -> Option<ObjectRecord> {
        self.objects.find_object(label)
    }

    /// Every Alive object in the session
    pub fn objects(&self) -> Vec<ObjectRecord> {
        self.objects.get_all_objects()
    }

    /// Number of data regions in the chain
    pub fn region_count(&self) -> usize {
        self.regions.region_count()
    }

    /// Usage snapshot of every data region
    pub fn region_stats(&self) -> Vec<RegionStats> {
        self.regions.stats()
    }

    /// Registered types across the header and the overflow chain
    pub fn total_type_count(&self) -> u32 {
        self.metadata.total_type_count()
    }

    /// Field entries across the header and the overflow chain
    pub fn total_field_count(&self) -> u32 {
        self.metadata.total_field_count()
    }

    /// Object entries across the header and the overflow chain
    pub fn total_object_count(&self) -> u32 {
        self.metadata.total_object_count()
    }

    /// Wait the configured grace interval, then unlink every region name.
    ///
    /// Observer mappings stay valid; no new observer can connect afterwards.
    pub fn shutdown(self) -> Result<()> {
        if !self.config.shutdown_grace.is_zero() {
            std::thread::sleep(self.config.shutdown_grace);
        }
        self.unlink_all();
        Ok(())
    }

    fn unlink_all(&self) {
        if self.unlinked.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut names = vec![shm::header_name(&self.name)];
        names.extend(self.regions.shm_names());
        names.extend(self.metadata.shm_names());
        for name in names {
            if let Err(e) = ShmRegion::unlink(&self.dir, &name) {
                debug!(name = %name, error = %e, "unlink failed");
            }
        }
        info!(session = %self.name, "session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unlink_all();
    }
}
