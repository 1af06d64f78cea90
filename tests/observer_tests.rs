//! Observer field access: arrays, wrappers, writes, failure modes

use std::mem::offset_of;

use memglass::{
    Atomic, Atomicity, Config, FieldDescriptor, Locked, MemglassError, Observer, PrimitiveType,
    Session, TypeDescriptor,
};
use tempfile::TempDir;

#[repr(C)]
struct Telemetry {
    counter: Atomic<u64>,
    mode: Locked<u32>,
    samples: [u32; 4],
    scale: f64,
}

fn telemetry_descriptor() -> TypeDescriptor {
    TypeDescriptor::of::<Telemetry>("Telemetry")
        .with_field(
            FieldDescriptor::new(
                "counter",
                offset_of!(Telemetry, counter) as u32,
                PrimitiveType::UInt64,
            )
            .with_atomicity(Atomicity::Atomic),
        )
        .with_field(
            FieldDescriptor::new(
                "mode",
                offset_of!(Telemetry, mode) as u32,
                PrimitiveType::UInt32,
            )
            .with_atomicity(Atomicity::Locked),
        )
        .with_field(
            FieldDescriptor::new(
                "samples",
                offset_of!(Telemetry, samples) as u32,
                PrimitiveType::UInt32,
            )
            .with_array_len(4),
        )
        .with_field(FieldDescriptor::new(
            "scale",
            offset_of!(Telemetry, scale) as u32,
            PrimitiveType::Float64,
        ))
}

fn setup(dir: &TempDir, name: &str) -> (Session, u32) {
    let config = Config::default()
        .with_base_dir(dir.path())
        .with_header_size(64 * 1024)
        .with_header_capacities(8, 64, 16)
        .with_initial_region_size(64 * 1024)
        .with_overflow_region_size(64 * 1024);
    let session = Session::create(name, config).unwrap();
    let type_id = session.register_type(&telemetry_descriptor()).unwrap();
    session
        .publish(
            type_id,
            "telemetry",
            Telemetry {
                counter: Atomic::new(5),
                mode: Locked::new(2),
                samples: [10, 20, 30, 40],
                scale: 0.5,
            },
        )
        .unwrap();
    (session, type_id)
}

#[test]
fn typed_reads_honor_atomicity() {
    let dir = TempDir::new().unwrap();
    let (_session, type_id) = setup(&dir, "obs1");

    let observer = Observer::connect_in("obs1", dir.path()).unwrap();
    let ty = observer.type_by_id(type_id).unwrap();
    assert_eq!(ty.name, "Telemetry");
    assert_eq!(ty.fields.len(), 4);

    let object = observer.find_object("telemetry").unwrap();
    let view = observer.get(&object).unwrap();

    assert_eq!(view.field("counter").unwrap().read_u64().unwrap(), 5);
    assert_eq!(view.field("mode").unwrap().read_u32().unwrap(), 2);
    assert_eq!(view.field("scale").unwrap().read_f64().unwrap(), 0.5);

    let info = view.field("counter").unwrap().info().clone();
    assert_eq!(info.atomicity, Atomicity::Atomic);
    assert_eq!(info.size, 8);
}

#[test]
fn array_indexing() {
    let dir = TempDir::new().unwrap();
    let (_session, _) = setup(&dir, "obs2");

    let observer = Observer::connect_in("obs2", dir.path()).unwrap();
    let object = observer.find_object("telemetry").unwrap();
    let view = observer.get(&object).unwrap();

    let samples = view.field("samples").unwrap();
    assert_eq!(samples.byte_len(), 16);
    for (i, expected) in [10u32, 20, 30, 40].iter().enumerate() {
        assert_eq!(samples.at(i as u32).unwrap().read_u32().unwrap(), *expected);
    }

    // Out-of-bounds element and indexing a scalar both fail
    assert!(matches!(
        samples.at(4),
        Err(MemglassError::InvalidField { .. })
    ));
    assert!(matches!(
        view.field("scale").unwrap().at(0),
        Err(MemglassError::InvalidField { .. })
    ));

    // The whole array reads as raw bytes
    let mut bytes = [0u8; 16];
    samples.read_bytes(&mut bytes).unwrap();
    assert_eq!(u32::from_ne_bytes(bytes[4..8].try_into().unwrap()), 20);
}

#[test]
fn size_mismatch_refused() {
    let dir = TempDir::new().unwrap();
    let (_session, _) = setup(&dir, "obs3");

    let observer = Observer::connect_in("obs3", dir.path()).unwrap();
    let object = observer.find_object("telemetry").unwrap();
    let view = observer.get(&object).unwrap();

    // u32 read of a u64 field
    assert!(matches!(
        view.field("counter").unwrap().read_u32(),
        Err(MemglassError::InvalidField { .. })
    ));
    // Whole-array read as a scalar
    assert!(matches!(
        view.field("samples").unwrap().read_u32(),
        Err(MemglassError::InvalidField { .. })
    ));
}

#[test]
fn unknown_field_paths() {
    let dir = TempDir::new().unwrap();
    let (_session, _) = setup(&dir, "obs4");

    let observer = Observer::connect_in("obs4", dir.path()).unwrap();
    let object = observer.find_object("telemetry").unwrap();
    let view = observer.get(&object).unwrap();

    assert!(matches!(
        view.field("missing"),
        Err(MemglassError::InvalidField { .. })
    ));
    assert!(matches!(
        view.field("counter").unwrap().field("nested"),
        Err(MemglassError::InvalidField { .. })
    ));
}

#[test]
fn observer_writes_through_wrappers_only() {
    let dir = TempDir::new().unwrap();
    let (session, _) = setup(&dir, "obs5");

    let observer = Observer::connect_in("obs5", dir.path()).unwrap();
    let object = observer.find_object("telemetry").unwrap();
    let view = observer.get(&object).unwrap();

    view.field("counter").unwrap().write(99u64).unwrap();
    view.field("mode").unwrap().write(7u32).unwrap();
    assert_eq!(view.field("counter").unwrap().read_u64().unwrap(), 99);
    assert_eq!(view.field("mode").unwrap().read_u32().unwrap(), 7);

    // Unguarded fields reject writes
    assert!(matches!(
        view.field("scale").unwrap().write(1.0f64),
        Err(MemglassError::InvalidParameter { .. })
    ));

    // The producer sees the wrapped writes
    let record = session.find_object("telemetry").unwrap();
    assert_eq!(record.label, "telemetry");
}

#[test]
fn sequence_drives_refresh() {
    let dir = TempDir::new().unwrap();
    let (session, type_id) = setup(&dir, "obs6");

    let mut observer = Observer::connect_in("obs6", dir.path()).unwrap();
    let mut last_seen = observer.sequence();
    assert_eq!(observer.objects().len(), 1);

    // Nothing changed: the canonical loop skips the refresh
    assert_eq!(observer.sequence(), last_seen);

    session
        .publish(
            type_id,
            "second",
            Telemetry {
                counter: Atomic::new(0),
                mode: Locked::new(0),
                samples: [0; 4],
                scale: 1.0,
            },
        )
        .unwrap();

    let seq = observer.sequence();
    assert!(seq > last_seen);
    observer.refresh().unwrap();
    last_seen = seq;
    assert_eq!(observer.objects().len(), 2);
    assert!(observer.sequence() >= last_seen);

    // Refresh is idempotent
    observer.refresh().unwrap();
    assert_eq!(observer.objects().len(), 2);
    assert_eq!(observer.types().len(), 1);
}

#[test]
fn sequence_never_decreases() {
    let dir = TempDir::new().unwrap();
    let (session, type_id) = setup(&dir, "obs7");
    let observer = Observer::connect_in("obs7", dir.path()).unwrap();

    let mut last = 0;
    for i in 0..10 {
        let seq = observer.sequence();
        assert!(seq >= last);
        last = seq;
        session
            .publish(
                type_id,
                &format!("obj{}", i),
                Telemetry {
                    counter: Atomic::new(i),
                    mode: Locked::new(0),
                    samples: [0; 4],
                    scale: 0.0,
                },
            )
            .unwrap();
    }
    assert!(observer.sequence() >= last);
}

#[test]
fn connect_failures() {
    let dir = TempDir::new().unwrap();

    assert!(matches!(
        Observer::connect_in("nosuch", dir.path()),
        Err(MemglassError::SessionUnavailable { .. })
    ));
    assert!(Observer::connect_in("bad/name", dir.path()).is_err());
}
