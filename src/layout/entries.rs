//! Type, field, and object directory entries

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use super::constants::*;
use super::{read_name, write_name};

/// Lifecycle state of an object entry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ObjectState {
    /// Slot allocated but not yet published
    Free = 0,
    /// Object is live; entry fields are fully initialized
    Alive = 1,
    /// Object was destroyed; memory is still mapped but stale
    Destroyed = 2,
}

impl ObjectState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => ObjectState::Alive,
            2 => ObjectState::Destroyed,
            _ => ObjectState::Free,
        }
    }
}

/// How a field is synchronized between the producer and observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum Atomicity {
    /// Direct reads and writes; multi-word values may tear
    #[default]
    None = 0,
    /// Lock-free atomic load/store; payload width ≤ 8 bytes
    Atomic = 1,
    /// Seqlock-guarded payload of any trivially-copyable size
    Seqlock = 2,
    /// Spin-flag-guarded payload with exclusive read/write/update
    Locked = 3,
}

impl Atomicity {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Atomicity::Atomic,
            2 => Atomicity::Seqlock,
            3 => Atomicity::Locked,
            _ => Atomicity::None,
        }
    }

    /// Display label, e.g. for viewer frontends
    pub fn as_str(self) -> &'static str {
        match self {
            Atomicity::None => "none",
            Atomicity::Atomic => "atomic",
            Atomicity::Seqlock => "seqlock",
            Atomicity::Locked => "locked",
        }
    }
}

/// Built-in primitive type ids; user-defined ids start at
/// [`PRIMITIVE_ID_LIMIT`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum PrimitiveType {
    Bool = 1,
    Int8 = 2,
    UInt8 = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float32 = 10,
    Float64 = 11,
    Char = 12,
}

impl PrimitiveType {
    pub fn type_id(self) -> u32 {
        self as u32
    }

    pub fn from_type_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(PrimitiveType::Bool),
            2 => Some(PrimitiveType::Int8),
            3 => Some(PrimitiveType::UInt8),
            4 => Some(PrimitiveType::Int16),
            5 => Some(PrimitiveType::UInt16),
            6 => Some(PrimitiveType::Int32),
            7 => Some(PrimitiveType::UInt32),
            8 => Some(PrimitiveType::Int64),
            9 => Some(PrimitiveType::UInt64),
            10 => Some(PrimitiveType::Float32),
            11 => Some(PrimitiveType::Float64),
            12 => Some(PrimitiveType::Char),
            _ => None,
        }
    }

    /// Payload size in bytes
    pub fn size(self) -> u32 {
        match self {
            PrimitiveType::Bool | PrimitiveType::Int8 | PrimitiveType::UInt8 => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Float64 => 8,
            PrimitiveType::Char => 1,
        }
    }

    /// Natural alignment; equals the size for every built-in primitive
    pub fn align(self) -> u32 {
        self.size()
    }
}

/// Field flag bits; the registering layer owns their meaning, the core
/// passes them through untouched
pub mod field_flags {
    pub const NONE: u32 = 0;
}

/// One registered record schema
#[repr(C)]
#[derive(Clone)]
pub struct TypeEntry {
    /// Stable 32-bit type id (hash of the fully-qualified name)
    pub type_id: u32,
    /// Number of fields in this type's field run
    pub field_count: u32,
    /// Record size in bytes
    pub size: u64,
    /// Record alignment in bytes
    pub alignment: u32,
    /// Index of the field run inside the owning store's field section
    pub first_field: u32,
    /// Backing store of the field run: 0 = header directory, else the
    /// overflow region id
    pub field_store: u64,
    /// Null-padded fully-qualified type name
    pub name: [u8; MAX_TYPE_NAME_LEN],
}

impl TypeEntry {
    pub fn new(
        type_id: u32,
        name: &str,
        size: u64,
        alignment: u32,
        field_count: u32,
        field_store: u64,
        first_field: u32,
    ) -> Self {
        let mut name_buf = [0u8; MAX_TYPE_NAME_LEN];
        write_name(&mut name_buf, name);
        Self {
            type_id,
            field_count,
            size,
            alignment,
            first_field,
            field_store,
            name: name_buf,
        }
    }

    pub fn name(&self) -> &str {
        read_name(&self.name)
    }
}

/// One field of a registered type
#[repr(C)]
#[derive(Clone)]
pub struct FieldEntry {
    /// Null-padded field name; dots denote nested-struct paths
    pub name: [u8; MAX_FIELD_NAME_LEN],
    /// Byte offset within the owning record; for wrapped fields this is the
    /// wrapper start
    pub offset: u32,
    /// Payload byte size; for array fields, the element size
    pub size: u32,
    /// Primitive or user type id
    pub type_id: u32,
    /// Element count for fixed arrays (0 = scalar)
    pub array_len: u32,
    /// Pass-through flag bitmask
    pub flags: u32,
    /// Atomicity tag, see [`Atomicity`]
    pub atomicity: u32,
    /// Nonzero when this entry marks a nested struct
    pub is_nested: u32,
    _reserved: u32,
}

impl FieldEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        offset: u32,
        size: u32,
        type_id: u32,
        array_len: u32,
        flags: u32,
        atomicity: Atomicity,
        is_nested: bool,
    ) -> Self {
        let mut name_buf = [0u8; MAX_FIELD_NAME_LEN];
        write_name(&mut name_buf, name);
        Self {
            name: name_buf,
            offset,
            size,
            type_id,
            array_len,
            flags,
            atomicity: atomicity as u32,
            is_nested: is_nested as u32,
            _reserved: 0,
        }
    }

    pub fn name(&self) -> &str {
        read_name(&self.name)
    }

    pub fn atomicity(&self) -> Atomicity {
        Atomicity::from_u32(self.atomicity)
    }
}

/// One live (or destroyed) object instance
#[repr(C)]
pub struct ObjectEntry {
    /// Lifecycle state, see [`ObjectState`]; release-stored after every
    /// other field is initialized
    pub state: AtomicU32,
    /// Type id of the instance
    pub type_id: u32,
    /// Monotonic per-slot counter, reserved for future ABA-safe reuse
    pub generation: u32,
    _reserved: u32,
    /// Data region holding the instance bytes
    pub region_id: u64,
    /// Byte offset of the instance within that region
    pub offset: u64,
    /// Null-padded user label
    pub label: [u8; MAX_LABEL_LEN],
}

impl ObjectEntry {
    /// Build an unpublished entry; the caller release-stores Alive after
    /// the slot is written
    pub fn new(type_id: u32, region_id: u64, offset: u64, label: &str) -> Self {
        let mut label_buf = [0u8; MAX_LABEL_LEN];
        write_name(&mut label_buf, label);
        Self {
            state: AtomicU32::new(ObjectState::Free as u32),
            type_id,
            generation: 1,
            _reserved: 0,
            region_id,
            offset,
            label: label_buf,
        }
    }

    pub fn label(&self) -> &str {
        read_name(&self.label)
    }

    /// Lifecycle state (acquire)
    pub fn state(&self) -> ObjectState {
        ObjectState::from_u32(self.state.load(Ordering::Acquire))
    }
}
