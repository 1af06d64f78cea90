//! Named shared-memory regions and the session name grammar
//!
//! Every memglass region is a file-backed mapping living under a shared
//! directory (`/dev/shm` where available). Create is exclusive: a region name
//! belongs to exactly one producer. Unlink removes the name from the
//! namespace; existing mappings stay valid until dropped.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{MemglassError, Result};

/// Maximum usable session name length in bytes (excluding the terminator)
pub const MAX_SESSION_NAME: usize = 63;

/// Full shared-memory name of a session's header region
pub fn header_name(session: &str) -> String {
    format!("memglass_{}_header", session)
}

/// Full shared-memory name of a data region
pub fn region_name(session: &str, id: u64) -> String {
    format!("memglass_{}_region_{:04}", session, id)
}

/// Full shared-memory name of a metadata overflow region
pub fn meta_name(session: &str, id: u64) -> String {
    format!("memglass_{}_meta_{:04}", session, id)
}

/// Validate a session name: printable ASCII, no path separators, ≤ 63 bytes
pub fn validate_session_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_SESSION_NAME {
        return Err(MemglassError::invalid_parameter(
            "session",
            "Session name must be 1..=63 bytes",
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b'/' && b != b'\\')
    {
        return Err(MemglassError::invalid_parameter(
            "session",
            "Session name must be printable ASCII without path separators",
        ));
    }
    Ok(())
}

/// Default directory for region files: `/dev/shm` when present, else the
/// system temp dir
pub fn default_shm_dir() -> PathBuf {
    let shm = PathBuf::from("/dev/shm");
    if shm.is_dir() {
        shm
    } else {
        std::env::temp_dir()
    }
}

/// A single mapped shared-memory region
#[derive(Debug)]
pub struct ShmRegion {
    /// Shared-memory name (not the filesystem path)
    name: String,
    /// Backing file path
    path: PathBuf,
    /// Mapped size in bytes
    size: usize,
    /// Memory mapping
    mmap: MmapMut,
    /// Keep the backing file open for the lifetime of the mapping
    _file: File,
}

impl ShmRegion {
    /// Create a new region of `size` zero-filled bytes under `dir`.
    ///
    /// Fails with [`MemglassError::NameConflict`] if the name already exists.
    pub fn create(dir: &Path, name: &str, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(MemglassError::invalid_parameter(
                "size",
                "Region size must be greater than 0",
            ));
        }

        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    MemglassError::name_conflict(name)
                } else {
                    MemglassError::from_io(e, "Failed to create region file")
                }
            })?;

        file.set_len(size as u64)
            .map_err(|e| MemglassError::from_io(e, "Failed to set region size"))?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(size)
                .map_mut(&file)
                .map_err(|e| MemglassError::from_io(e, "Failed to map region"))?
        };

        Ok(Self {
            name: name.to_string(),
            path,
            size,
            mmap,
            _file: file,
        })
    }

    /// Open an existing region by name; size comes from the backing file.
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| MemglassError::from_io(e, "Failed to open region file"))?;

        let size = file
            .metadata()
            .map_err(|e| MemglassError::from_io(e, "Failed to stat region file"))?
            .len() as usize;
        if size == 0 {
            return Err(MemglassError::invalid_parameter(
                "size",
                "Region file is empty",
            ));
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(size)
                .map_mut(&file)
                .map_err(|e| MemglassError::from_io(e, "Failed to map region"))?
        };

        Ok(Self {
            name: name.to_string(),
            path,
            size,
            mmap,
            _file: file,
        })
    }

    /// Remove a region name from the namespace.
    ///
    /// Existing mappings remain valid; no future process can open the name.
    pub fn unlink(dir: &Path, name: &str) -> Result<()> {
        std::fs::remove_file(dir.join(name))
            .map_err(|e| MemglassError::from_io(e, "Failed to unlink region"))
    }

    /// Shared-memory name of this region
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filesystem path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapped size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Base address of the mapping
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    /// Mutable base address of the mapping
    ///
    /// # Safety
    /// Caller must uphold the producer/observer write discipline: plain
    /// stores through this pointer are unsynchronized.
    pub unsafe fn as_mut_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    /// Whether `ptr` points inside this mapping
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.mmap.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.size
    }
}

unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_name_grammar() {
        assert_eq!(header_name("t1"), "memglass_t1_header");
        assert_eq!(region_name("t1", 1), "memglass_t1_region_0001");
        assert_eq!(region_name("t1", 42), "memglass_t1_region_0042");
        assert_eq!(meta_name("t1", 3), "memglass_t1_meta_0003");
    }

    #[test]
    fn test_session_name_validation() {
        assert!(validate_session_name("t1").is_ok());
        assert!(validate_session_name("market-data_01").is_ok());
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("a/b").is_err());
        assert!(validate_session_name("has space").is_err());
        assert!(validate_session_name(&"x".repeat(64)).is_err());
        assert!(validate_session_name(&"x".repeat(63)).is_ok());
    }

    #[test]
    fn test_create_open_unlink() {
        let dir = TempDir::new().unwrap();
        let region = ShmRegion::create(dir.path(), "memglass_t_header", 4096).unwrap();
        assert_eq!(region.size(), 4096);
        assert_eq!(region.name(), "memglass_t_header");

        // Created zero-filled
        let byte = unsafe { *region.as_ptr() };
        assert_eq!(byte, 0);

        // Write through the creator, read through an independent mapping
        unsafe { *region.as_mut_ptr() = 0xAB };
        let other = ShmRegion::open(dir.path(), "memglass_t_header").unwrap();
        assert_eq!(other.size(), 4096);
        assert_eq!(unsafe { *other.as_ptr() }, 0xAB);

        ShmRegion::unlink(dir.path(), "memglass_t_header").unwrap();
        assert!(ShmRegion::open(dir.path(), "memglass_t_header").is_err());
        // Existing mappings survive the unlink
        assert_eq!(unsafe { *other.as_ptr() }, 0xAB);
    }

    #[test]
    fn test_create_conflict() {
        let dir = TempDir::new().unwrap();
        let _first = ShmRegion::create(dir.path(), "memglass_c_header", 1024).unwrap();
        let second = ShmRegion::create(dir.path(), "memglass_c_header", 1024);
        assert!(matches!(
            second,
            Err(MemglassError::NameConflict { .. })
        ));
    }

    #[test]
    fn test_contains() {
        let dir = TempDir::new().unwrap();
        let region = ShmRegion::create(dir.path(), "memglass_p_header", 256).unwrap();
        let base = region.as_ptr();
        assert!(region.contains(base));
        assert!(region.contains(unsafe { base.add(255) }));
        assert!(!region.contains(unsafe { base.add(256) }));
    }
}
