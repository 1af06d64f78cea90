//! # Memglass - Shared-Memory Telemetry Substrate
//!
//! Memglass lets a producer process publish live instances of plain-data
//! record types into shared memory so that observer processes, mapping the
//! same memory, can introspect those instances by field name and type:
//! no serialization, no stopping the producer, and no producer code paths
//! touched beyond object construction.
//!
//! ## Features
//!
//! - **Self-describing sessions**: a header region carries type, field, and
//!   object directories that any observer can walk
//! - **Bump-allocated data regions**: monotonic allocation with lock-free
//!   growth and region chaining
//! - **Metadata overflow**: directories spill into chained overflow regions
//!   when the header fills up
//! - **Atomicity wrappers**: atomic cells, seqlocks, and spin-locked cells
//!   give observers torn-free reads without blocking the producer
//! - **Sequence-based change detection**: observers poll one counter to
//!   know when to refresh
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Producer Session                    │
//! ├──────────────────────────────────────────────────────┤
//! │  Header Region           │  Data Regions             │
//! │  - magic / version       │  - bump-allocated objects │
//! │  - sequence counter      │  - chained by id          │
//! │  - type/field/object     │                           │
//! │    directories           │  Overflow Regions         │
//! │                          │  - spilled metadata       │
//! └──────────────────────────────────────────────────────┘
//!            │                          │
//!            ▼                          ▼
//! ┌─────────────────┐       ┌─────────────────────────┐
//! │    Observer      │  ...  │       Observer          │
//! │  (read-only map) │       │    (read-only map)      │
//! └─────────────────┘       └─────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use memglass::{
//!     Atomicity, Config, FieldDescriptor, Observer, PrimitiveType, Session,
//!     TypeDescriptor,
//! };
//!
//! #[repr(C)]
//! struct Quote {
//!     bid_price: i64,
//!     ask_price: i64,
//! }
//!
//! # fn main() -> memglass::Result<()> {
//! let session = Session::create("market", Config::default())?;
//! let type_id = session.register_type(
//!     &TypeDescriptor::of::<Quote>("Quote")
//!         .with_field(
//!             FieldDescriptor::new("bid_price", 0, PrimitiveType::Int64)
//!                 .with_atomicity(Atomicity::Atomic),
//!         )
//!         .with_field(
//!             FieldDescriptor::new("ask_price", 8, PrimitiveType::Int64)
//!                 .with_atomicity(Atomicity::Atomic),
//!         ),
//! )?;
//! session.publish(type_id, "AAPL", Quote { bid_price: 101, ask_price: 102 })?;
//!
//! // In another process:
//! let observer = Observer::connect("market")?;
//! let quote = observer.find_object("AAPL").unwrap();
//! let view = observer.get(&quote)?;
//! assert_eq!(view.field("bid_price")?.read_i64()?, 101);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod error;
pub mod header;
pub mod layout;
pub mod metadata;
pub mod objects;
pub mod observer;
pub mod regions;
pub mod registry;
pub mod session;
pub mod shm;
pub mod sync;

// Main API re-exports
pub use error::{MemglassError, Result};
pub use layout::{
    Atomicity, ObjectState, PrimitiveType, HEADER_MAGIC, OVERFLOW_MAGIC, PROTOCOL_VERSION,
    REGION_MAGIC,
};
pub use objects::ObjectRecord;
pub use observer::{
    FieldProxy, FieldValue, ObjectView, ObservedField, ObservedObject, ObservedType, Observer,
};
pub use regions::RegionStats;
pub use registry::{stable_type_id, FieldDescriptor, TypeDescriptor};
pub use session::{defaults, Config, Session};
pub use shm::ShmRegion;
pub use sync::{payload_offset, Atomic, Guarded, Locked};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
