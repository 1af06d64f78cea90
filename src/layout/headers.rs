//! Header and descriptor structures shared between producer and observers

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{MemglassError, Result};

use super::constants::*;
use super::{read_name, write_name};

/// One directory inside the session header: a fixed-capacity array of
/// entries starting at `offset` from the header region base
#[repr(C)]
pub struct DirectoryDescriptor {
    /// Byte offset of the entry array from the start of the header region
    pub offset: u32,
    /// Fixed entry capacity
    pub capacity: u32,
    /// Number of published entries (release-stored by the producer)
    pub count: AtomicU32,
    _reserved: u32,
}

impl DirectoryDescriptor {
    pub fn new(offset: u32, capacity: u32) -> Self {
        Self {
            offset,
            capacity,
            count: AtomicU32::new(0),
            _reserved: 0,
        }
    }

    /// Published entry count (acquire)
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

/// One section inside a metadata overflow region; offsets are relative to
/// the overflow region base
#[repr(C)]
pub struct SectionDescriptor {
    pub offset: u32,
    pub capacity: u32,
    pub count: AtomicU32,
    _reserved: u32,
}

impl SectionDescriptor {
    pub fn new(offset: u32, capacity: u32) -> Self {
        Self {
            offset,
            capacity,
            count: AtomicU32::new(0),
            _reserved: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

/// Fixed-size record at the start of the header region, one per session
#[repr(C)]
pub struct SessionHeader {
    /// Magic number for validation
    pub magic: u64,
    /// Protocol version
    pub version: u32,
    /// Size of this struct, for layout cross-checks
    pub header_size: u32,
    /// Monotonic sequence counter; incremented after every structural change
    pub sequence: AtomicU64,
    /// Type directory descriptor
    pub type_dir: DirectoryDescriptor,
    /// Field directory descriptor
    pub field_dir: DirectoryDescriptor,
    /// Object directory descriptor
    pub object_dir: DirectoryDescriptor,
    /// Id of the first data region (0 until published)
    pub first_region_id: AtomicU64,
    /// Id of the first metadata overflow region (0 = none)
    pub first_overflow_id: AtomicU64,
    /// Null-padded session name
    pub session_name: [u8; MAX_SESSION_NAME_LEN],
    /// Producer process id
    pub producer_pid: u32,
    _reserved: u32,
    /// Session start, seconds since the Unix epoch
    pub start_timestamp: u64,
}

impl SessionHeader {
    /// Build a fresh header; directory descriptors are supplied by the
    /// caller, which decides the in-header layout
    pub fn new(
        session: &str,
        type_dir: DirectoryDescriptor,
        field_dir: DirectoryDescriptor,
        object_dir: DirectoryDescriptor,
    ) -> Self {
        let mut session_name = [0u8; MAX_SESSION_NAME_LEN];
        write_name(&mut session_name, session);

        Self {
            magic: HEADER_MAGIC,
            version: PROTOCOL_VERSION,
            header_size: size_of::<SessionHeader>() as u32,
            sequence: AtomicU64::new(0),
            type_dir,
            field_dir,
            object_dir,
            first_region_id: AtomicU64::new(0),
            first_overflow_id: AtomicU64::new(0),
            session_name,
            producer_pid: std::process::id(),
            _reserved: 0,
            start_timestamp: std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_secs(),
        }
    }

    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != HEADER_MAGIC {
            return Err(MemglassError::protocol_mismatch(HEADER_MAGIC, self.magic));
        }
        if self.version != PROTOCOL_VERSION {
            return Err(MemglassError::protocol_mismatch(
                PROTOCOL_VERSION as u64,
                self.version as u64,
            ));
        }
        Ok(())
    }

    /// Session name as a str slice
    pub fn session_name(&self) -> &str {
        read_name(&self.session_name)
    }

    /// Current sequence value (acquire)
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Publish a structural change: increment the sequence with release
    /// ordering after the change itself has been release-stored
    pub fn bump_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Release) + 1
    }
}

/// Descriptor at offset 0 of every data region; user bytes begin
/// immediately after it
#[repr(C)]
pub struct RegionDescriptor {
    /// Magic number for validation
    pub magic: u64,
    /// Region id (1-based, allocation order)
    pub region_id: u64,
    /// Total region size in bytes, descriptor included
    pub size: u64,
    /// Next free offset from the region base; `sizeof(descriptor)` when empty
    pub used: AtomicU64,
    /// Id of the next region in the chain (0 = tail)
    pub next_region_id: AtomicU64,
    /// Null-padded shared-memory name of this region
    pub shm_name: [u8; MAX_SHM_NAME_LEN],
}

impl RegionDescriptor {
    pub fn new(region_id: u64, size: u64, shm_name: &str) -> Self {
        let mut name = [0u8; MAX_SHM_NAME_LEN];
        write_name(&mut name, shm_name);
        Self {
            magic: REGION_MAGIC,
            region_id,
            size,
            used: AtomicU64::new(size_of::<RegionDescriptor>() as u64),
            next_region_id: AtomicU64::new(0),
            shm_name: name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.magic != REGION_MAGIC {
            return Err(MemglassError::protocol_mismatch(REGION_MAGIC, self.magic));
        }
        Ok(())
    }

    pub fn shm_name(&self) -> &str {
        read_name(&self.shm_name)
    }
}

/// Descriptor at offset 0 of every metadata overflow region; the object,
/// type, and field sections are laid out contiguously after it
#[repr(C)]
pub struct OverflowDescriptor {
    /// Magic number for validation
    pub magic: u64,
    /// Overflow region id (1-based, independent of data region ids)
    pub region_id: u64,
    /// Id of the next overflow region in the chain (0 = tail)
    pub next_region_id: AtomicU64,
    /// Object entry section
    pub objects: SectionDescriptor,
    /// Type entry section
    pub types: SectionDescriptor,
    /// Field entry section
    pub fields: SectionDescriptor,
    /// Null-padded shared-memory name of this region
    pub shm_name: [u8; MAX_SHM_NAME_LEN],
}

impl OverflowDescriptor {
    pub fn new(
        region_id: u64,
        objects: SectionDescriptor,
        types: SectionDescriptor,
        fields: SectionDescriptor,
        shm_name: &str,
    ) -> Self {
        let mut name = [0u8; MAX_SHM_NAME_LEN];
        write_name(&mut name, shm_name);
        Self {
            magic: OVERFLOW_MAGIC,
            region_id,
            next_region_id: AtomicU64::new(0),
            objects,
            types,
            fields,
            shm_name: name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.magic != OVERFLOW_MAGIC {
            return Err(MemglassError::protocol_mismatch(OVERFLOW_MAGIC, self.magic));
        }
        Ok(())
    }

    pub fn shm_name(&self) -> &str {
        read_name(&self.shm_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::align_of;

    #[test]
    fn test_layout_sizes() {
        // The wire layout is a protocol contract; changing any of these
        // requires a PROTOCOL_VERSION bump.
        assert_eq!(size_of::<DirectoryDescriptor>(), 16);
        assert_eq!(size_of::<SectionDescriptor>(), 16);
        assert_eq!(size_of::<SessionHeader>(), 168);
        assert_eq!(size_of::<RegionDescriptor>(), 168);
        assert_eq!(size_of::<OverflowDescriptor>(), 200);

        assert_eq!(align_of::<SessionHeader>(), 8);
        assert_eq!(align_of::<RegionDescriptor>(), 8);
        assert_eq!(align_of::<OverflowDescriptor>(), 8);
    }

    #[test]
    fn test_header_validate() {
        let header = SessionHeader::new(
            "t1",
            DirectoryDescriptor::new(168, 8),
            DirectoryDescriptor::new(1000, 8),
            DirectoryDescriptor::new(2000, 8),
        );
        header.validate().unwrap();
        assert_eq!(header.session_name(), "t1");
        assert_eq!(header.header_size as usize, size_of::<SessionHeader>());
        assert_eq!(header.producer_pid, std::process::id());

        let mut bad = header;
        bad.version = PROTOCOL_VERSION + 1;
        assert!(matches!(
            bad.validate(),
            Err(MemglassError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn test_region_descriptor() {
        let desc = RegionDescriptor::new(1, 4096, "memglass_t1_region_0001");
        desc.validate().unwrap();
        assert_eq!(desc.shm_name(), "memglass_t1_region_0001");
        assert_eq!(
            desc.used.load(Ordering::Relaxed),
            size_of::<RegionDescriptor>() as u64
        );
        assert_eq!(desc.next_region_id.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_sequence_bump() {
        let header = SessionHeader::new(
            "seq",
            DirectoryDescriptor::new(168, 1),
            DirectoryDescriptor::new(200, 1),
            DirectoryDescriptor::new(300, 1),
        );
        assert_eq!(header.sequence(), 0);
        assert_eq!(header.bump_sequence(), 1);
        assert_eq!(header.bump_sequence(), 2);
        assert_eq!(header.sequence(), 2);
    }
}
