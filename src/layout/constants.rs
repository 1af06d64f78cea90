//! Protocol constants for the memglass session layout

/// Magic number at the start of the session header region ("MEMGLASS")
pub const HEADER_MAGIC: u64 = 0x4D45_4D47_4C41_5353;

/// Magic number at the start of each data region ("MGREGION")
pub const REGION_MAGIC: u64 = 0x4D47_5245_4749_4F4E;

/// Magic number at the start of each metadata overflow region ("MGOVRFLW")
pub const OVERFLOW_MAGIC: u64 = 0x4D47_4F56_5246_4C57;

/// Protocol version, incremented on any layout-breaking change
pub const PROTOCOL_VERSION: u32 = 1;

/// Capacity of the null-padded session name field in the header
pub const MAX_SESSION_NAME_LEN: usize = 64;

/// Capacity of the null-padded shared-memory name field in region descriptors
pub const MAX_SHM_NAME_LEN: usize = 128;

/// Capacity of the null-padded type name field
pub const MAX_TYPE_NAME_LEN: usize = 128;

/// Capacity of the null-padded field name field
pub const MAX_FIELD_NAME_LEN: usize = 64;

/// Capacity of the null-padded object label field
pub const MAX_LABEL_LEN: usize = 64;

/// Type ids below this limit are reserved for built-in primitives;
/// user-defined type ids are at or above it
pub const PRIMITIVE_ID_LIMIT: u32 = 256;

/// Byte-share split of an overflow region between object, type, and field
/// sections, in percent
pub const OVERFLOW_OBJECT_SHARE: usize = 50;
pub const OVERFLOW_TYPE_SHARE: usize = 10;
pub const OVERFLOW_FIELD_SHARE: usize = 40;
