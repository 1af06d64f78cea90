//! Type registration: schemas, stable type ids, descriptor population
//!
//! A producer registers a record schema once under its fully-qualified name;
//! the registry assigns a stable 32-bit id (a hash of the name), allocates a
//! type entry plus a contiguous run of field entries through the metadata
//! manager, and publishes the change through the session sequence.
//!
//! Field names may encode nesting via dotted paths (`quote.bid_price`); the
//! registering layer is free to submit them pre-flattened. Members of a
//! seqlock- or lock-wrapped composite are submitted with atomicity None at
//! their absolute payload offsets; composite-consistent reads go through the
//! `is_nested` marker entry carrying the wrapper's tag.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{MemglassError, Result},
    header::HeaderRegion,
    layout::{
        field_flags, Atomicity, FieldEntry, PrimitiveType, TypeEntry, MAX_FIELD_NAME_LEN,
        MAX_TYPE_NAME_LEN, PRIMITIVE_ID_LIMIT,
    },
    metadata::MetadataManager,
    sync::payload_offset,
};

/// Compute the stable 32-bit id for a type name (FNV-1a); ids below
/// [`PRIMITIVE_ID_LIMIT`] are reserved and get bumped past it
pub fn stable_type_id(name: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    if hash < PRIMITIVE_ID_LIMIT {
        hash + PRIMITIVE_ID_LIMIT
    } else {
        hash
    }
}

/// One field of a schema being registered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Byte offset within the record; for wrapped fields, the wrapper start
    pub offset: u32,
    /// Payload byte size; for arrays, the element size
    pub size: u32,
    pub type_id: u32,
    /// Element count for fixed arrays (0 = scalar)
    pub array_len: u32,
    pub flags: u32,
    pub atomicity: Atomicity,
    pub is_nested: bool,
}

impl FieldDescriptor {
    /// A scalar primitive field
    pub fn new(name: impl Into<String>, offset: u32, primitive: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            offset,
            size: primitive.size(),
            type_id: primitive.type_id(),
            array_len: 0,
            flags: field_flags::NONE,
            atomicity: Atomicity::None,
            is_nested: false,
        }
    }

    /// A field with an explicit size and type id (user types, raw blobs)
    pub fn raw(name: impl Into<String>, offset: u32, size: u32, type_id: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            type_id,
            array_len: 0,
            flags: field_flags::NONE,
            atomicity: Atomicity::None,
            is_nested: false,
        }
    }

    /// A nested-struct marker entry covering a whole sub-record
    pub fn nested(name: impl Into<String>, offset: u32, size: u32, type_id: u32) -> Self {
        Self {
            is_nested: true,
            ..Self::raw(name, offset, size, type_id)
        }
    }

    pub fn with_atomicity(mut self, atomicity: Atomicity) -> Self {
        self.atomicity = atomicity;
        self
    }

    pub fn with_array_len(mut self, array_len: u32) -> Self {
        self.array_len = array_len;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Total payload bytes: element size times element count
    pub fn total_size(&self) -> u32 {
        self.size * self.array_len.max(1)
    }

    /// Payload alignment used for the wrapper offset contract: the
    /// primitive's natural alignment, or 8 for composite payloads
    pub fn payload_align(&self) -> usize {
        PrimitiveType::from_type_id(self.type_id)
            .map(|p| p.align() as usize)
            .unwrap_or(8)
    }
}

/// A schema being registered: name, extents, ordered fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub size: u64,
    pub alignment: u32,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, size: u64, alignment: u32) -> Self {
        Self {
            name: name.into(),
            size,
            alignment,
            fields: Vec::new(),
        }
    }

    /// Derive size and alignment from a Rust type
    pub fn of<T>(name: impl Into<String>) -> Self {
        Self::new(
            name,
            std::mem::size_of::<T>() as u64,
            std::mem::align_of::<T>() as u32,
        )
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
}

/// Producer-side registry of record schemas
pub struct TypeRegistry {
    header: Arc<HeaderRegion>,
    metadata: Arc<MetadataManager>,
    registered: Mutex<HashMap<u32, TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new(header: Arc<HeaderRegion>, metadata: Arc<MetadataManager>) -> Self {
        Self {
            header,
            metadata,
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// Register a schema, returning its stable type id.
    ///
    /// Registering an identical schema again is idempotent; a different
    /// schema under the same id fails with
    /// [`MemglassError::AlreadyRegistered`].
    pub fn register(&self, descriptor: &TypeDescriptor) -> Result<u32> {
        Self::validate(descriptor)?;
        let type_id = stable_type_id(&descriptor.name);

        let mut registered = self.registered.lock().unwrap();
        if let Some(existing) = registered.get(&type_id) {
            if existing == descriptor {
                return Ok(type_id);
            }
            return Err(MemglassError::already_registered(&descriptor.name, type_id));
        }

        let entries: Vec<FieldEntry> = descriptor
            .fields
            .iter()
            .map(|f| {
                FieldEntry::new(
                    &f.name,
                    f.offset,
                    f.size,
                    f.type_id,
                    f.array_len,
                    f.flags,
                    f.atomicity,
                    f.is_nested,
                )
            })
            .collect();

        let (field_store, first_field) = if entries.is_empty() {
            (crate::metadata::HEADER_STORE, 0)
        } else {
            let run = self.metadata.allocate_field_entries(&entries)?;
            (run.store, run.first)
        };

        self.metadata.allocate_type_entry(TypeEntry::new(
            type_id,
            &descriptor.name,
            descriptor.size,
            descriptor.alignment,
            entries.len() as u32,
            field_store,
            first_field,
        ))?;

        registered.insert(type_id, descriptor.clone());
        self.header.bump_sequence();

        debug!(
            type_id,
            name = %descriptor.name,
            fields = descriptor.fields.len(),
            "registered type"
        );
        Ok(type_id)
    }

    fn validate(descriptor: &TypeDescriptor) -> Result<()> {
        if descriptor.name.is_empty() || descriptor.name.len() >= MAX_TYPE_NAME_LEN {
            return Err(MemglassError::invalid_parameter(
                "name",
                "Type name must be 1..=127 bytes",
            ));
        }
        if descriptor.size == 0 {
            return Err(MemglassError::invalid_parameter(
                "size",
                "Type size must be greater than 0",
            ));
        }
        if descriptor.alignment == 0 || !descriptor.alignment.is_power_of_two() {
            return Err(MemglassError::invalid_parameter(
                "alignment",
                "Alignment must be a power of 2",
            ));
        }

        let mut seen = HashSet::new();
        for field in &descriptor.fields {
            if field.name.is_empty() || field.name.len() >= MAX_FIELD_NAME_LEN {
                return Err(MemglassError::invalid_parameter(
                    "field",
                    format!("Field name must be 1..=63 bytes: {:?}", field.name),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(MemglassError::invalid_parameter(
                    "field",
                    format!("Duplicate field name: {}", field.name),
                ));
            }
            if field.size == 0 {
                return Err(MemglassError::invalid_parameter(
                    "field",
                    format!("Field {} has zero size", field.name),
                ));
            }
            if field.atomicity == Atomicity::Atomic
                && !matches!(field.size, 1 | 2 | 4 | 8)
            {
                return Err(MemglassError::invalid_parameter(
                    "field",
                    format!(
                        "Atomic field {} needs a lock-free width (1/2/4/8), got {}",
                        field.name, field.size
                    ),
                ));
            }

            let wrapper_extra = payload_offset(field.atomicity, field.payload_align());
            let end = field.offset as u64 + wrapper_extra as u64 + field.total_size() as u64;
            if end > descriptor.size {
                return Err(MemglassError::invalid_parameter(
                    "field",
                    format!(
                        "Field {} extends to byte {} beyond type size {}",
                        field.name, end, descriptor.size
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::HEADER_STORE;
    use tempfile::TempDir;

    fn setup(dir: &std::path::Path) -> TypeRegistry {
        let header =
            Arc::new(HeaderRegion::create(dir, "reg", 256 * 1024, 16, 256, 32).unwrap());
        let metadata =
            Arc::new(MetadataManager::new(header.clone(), "reg", dir, 64 * 1024).unwrap());
        TypeRegistry::new(header, metadata)
    }

    fn quote_descriptor() -> TypeDescriptor {
        TypeDescriptor::new("Quote", 40, 8)
            .with_field(
                FieldDescriptor::new("bid_price", 0, PrimitiveType::Int64)
                    .with_atomicity(Atomicity::Atomic),
            )
            .with_field(
                FieldDescriptor::new("ask_price", 8, PrimitiveType::Int64)
                    .with_atomicity(Atomicity::Atomic),
            )
            .with_field(FieldDescriptor::new("bid_size", 16, PrimitiveType::UInt32))
            .with_field(FieldDescriptor::new("ask_size", 20, PrimitiveType::UInt32))
            .with_field(FieldDescriptor::new("ts", 24, PrimitiveType::UInt64))
    }

    #[test]
    fn test_stable_type_id_properties() {
        let id = stable_type_id("Quote");
        assert_eq!(id, stable_type_id("Quote"));
        assert!(id >= PRIMITIVE_ID_LIMIT);
        assert_ne!(stable_type_id("Quote"), stable_type_id("Quote2"));
    }

    #[test]
    fn test_register_and_reread() {
        let dir = TempDir::new().unwrap();
        let registry = setup(dir.path());

        let id = registry.register(&quote_descriptor()).unwrap();
        assert!(id >= PRIMITIVE_ID_LIMIT);
        assert_eq!(registry.metadata.total_type_count(), 1);
        assert_eq!(registry.metadata.total_field_count(), 5);

        // Field run landed in the header store; read it back
        let header = registry.header.header();
        assert_eq!(header.type_dir.count(), 1);
        let entry = unsafe { &*registry.header.type_entry_ptr(0) };
        assert_eq!(entry.type_id, id);
        assert_eq!(entry.name(), "Quote");
        assert_eq!(entry.field_count, 5);
        assert_eq!(entry.field_store, HEADER_STORE);

        let first = unsafe { &*registry.header.field_entry_ptr(entry.first_field) };
        assert_eq!(first.name(), "bid_price");
        assert_eq!(first.atomicity(), Atomicity::Atomic);
    }

    #[test]
    fn test_idempotent_registration() {
        let dir = TempDir::new().unwrap();
        let registry = setup(dir.path());

        let id1 = registry.register(&quote_descriptor()).unwrap();
        let seq = registry.header.sequence();
        let id2 = registry.register(&quote_descriptor()).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(registry.metadata.total_type_count(), 1);
        assert_eq!(registry.header.sequence(), seq);
    }

    #[test]
    fn test_conflicting_schema_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = setup(dir.path());

        registry.register(&quote_descriptor()).unwrap();
        let mut conflicting = quote_descriptor();
        conflicting.size = 48;
        assert!(matches!(
            registry.register(&conflicting),
            Err(MemglassError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_validation_errors() {
        let dir = TempDir::new().unwrap();
        let registry = setup(dir.path());

        // Duplicate field names
        let dup = TypeDescriptor::new("Dup", 16, 8)
            .with_field(FieldDescriptor::new("x", 0, PrimitiveType::UInt64))
            .with_field(FieldDescriptor::new("x", 8, PrimitiveType::UInt64));
        assert!(registry.register(&dup).is_err());

        // Field past the end of the record
        let oob = TypeDescriptor::new("Oob", 8, 8)
            .with_field(FieldDescriptor::new("x", 8, PrimitiveType::UInt64));
        assert!(registry.register(&oob).is_err());

        // Atomic tag on a non-lock-free width
        let wide = TypeDescriptor::new("Wide", 32, 8).with_field(
            FieldDescriptor::raw("blob", 0, 16, 0).with_atomicity(Atomicity::Atomic),
        );
        assert!(registry.register(&wide).is_err());
    }

    #[test]
    fn test_wrapped_field_extent_includes_control_word() {
        let dir = TempDir::new().unwrap();
        let registry = setup(dir.path());

        // Payload of 8 at wrapper offset 0 needs 16 bytes (8 control+pad)
        let tight = TypeDescriptor::new("Tight", 8, 8).with_field(
            FieldDescriptor::new("v", 0, PrimitiveType::UInt64)
                .with_atomicity(Atomicity::Seqlock),
        );
        assert!(registry.register(&tight).is_err());

        let fits = TypeDescriptor::new("Fits", 16, 8).with_field(
            FieldDescriptor::new("v", 0, PrimitiveType::UInt64)
                .with_atomicity(Atomicity::Seqlock),
        );
        assert!(registry.register(&fits).is_ok());
    }
}
