//! Seqlock consistency under concurrent writes, in-process and through the
//! full observer stack

use std::mem::offset_of;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use memglass::{
    Atomicity, Config, FieldDescriptor, Guarded, Observer, PrimitiveType, Session,
    TypeDescriptor,
};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
struct Pair {
    bid: u64,
    ask: u64,
}

#[repr(C)]
struct Ticker {
    pair: Guarded<Pair>,
}

fn ticker_descriptor() -> TypeDescriptor {
    let pair_offset = offset_of!(Ticker, pair) as u32;
    // The marker entry carries the seqlock tag; the flattened members are
    // raw entries at their absolute payload offsets
    let payload = pair_offset + memglass::payload_offset(Atomicity::Seqlock, 8) as u32;
    TypeDescriptor::of::<Ticker>("Ticker")
        .with_field(
            FieldDescriptor::nested("pair", pair_offset, std::mem::size_of::<Pair>() as u32, 0)
                .with_atomicity(Atomicity::Seqlock),
        )
        .with_field(FieldDescriptor::new(
            "pair.bid",
            payload + offset_of!(Pair, bid) as u32,
            PrimitiveType::UInt64,
        ))
        .with_field(FieldDescriptor::new(
            "pair.ask",
            payload + offset_of!(Pair, ask) as u32,
            PrimitiveType::UInt64,
        ))
}

fn read_pair(bytes: &[u8; 16]) -> Pair {
    Pair {
        bid: u64::from_ne_bytes(bytes[..8].try_into().unwrap()),
        ask: u64::from_ne_bytes(bytes[8..].try_into().unwrap()),
    }
}

#[test]
fn guarded_reads_never_tear_in_process() {
    let cell = Arc::new(Guarded::new(Pair { bid: 0, ask: 1 }));
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let cell = Arc::clone(&cell);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut n = 0u64;
            while !stop.load(Ordering::Relaxed) {
                n += 1;
                cell.write(Pair { bid: n, ask: n + 1 });
            }
            n
        })
    };

    for _ in 0..100_000 {
        let pair = cell.read();
        assert_eq!(pair.ask, pair.bid + 1, "torn read: {:?}", pair);
    }

    stop.store(true, Ordering::Relaxed);
    let writes = writer.join().unwrap();
    assert!(writes > 0);
}

#[test]
fn observer_seqlock_reads_never_tear() {
    let dir = TempDir::new().unwrap();
    let config = Config::default()
        .with_base_dir(dir.path())
        .with_header_size(64 * 1024)
        .with_header_capacities(8, 64, 16)
        .with_initial_region_size(64 * 1024)
        .with_overflow_region_size(64 * 1024);
    let session = Arc::new(Session::create("seq", config).unwrap());

    let type_id = session.register_type(&ticker_descriptor()).unwrap();
    let ptr = session
        .publish(
            type_id,
            "EURUSD",
            Ticker {
                pair: Guarded::new(Pair { bid: 0, ask: 1 }),
            },
        )
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writer = {
        let session = Arc::clone(&session);
        let stop = Arc::clone(&stop);
        let addr = ptr.as_ptr() as usize;
        std::thread::spawn(move || {
            let ticker = unsafe { &*(addr as *const Ticker) };
            let mut n = 0u64;
            while !stop.load(Ordering::Relaxed) {
                n += 1;
                ticker.pair.write(Pair { bid: n, ask: n + 1 });
            }
            drop(session);
        })
    };

    let observer = Observer::connect_in("seq", dir.path()).unwrap();
    let object = observer.find_object("EURUSD").unwrap();
    let view = observer.get(&object).unwrap();
    let proxy = view.field("pair").unwrap();
    assert_eq!(proxy.atomicity(), Atomicity::Seqlock);

    let mut bytes = [0u8; 16];
    for _ in 0..100_000 {
        proxy.read_bytes(&mut bytes[..]).unwrap();
        let pair = read_pair(&bytes);
        assert_eq!(pair.ask, pair.bid + 1, "torn read: {:?}", pair);
    }

    // The non-blocking variant also yields only coherent snapshots
    let mut coherent = 0;
    for _ in 0..10_000 {
        if proxy.try_read_bytes(&mut bytes[..]).unwrap() {
            let pair = read_pair(&bytes);
            assert_eq!(pair.ask, pair.bid + 1);
            coherent += 1;
        }
    }
    assert!(coherent > 0);

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[test]
fn flattened_members_resolve_inside_payload() {
    let dir = TempDir::new().unwrap();
    let config = Config::default()
        .with_base_dir(dir.path())
        .with_header_size(64 * 1024)
        .with_header_capacities(8, 64, 16)
        .with_initial_region_size(64 * 1024)
        .with_overflow_region_size(64 * 1024);
    let session = Session::create("flat", config).unwrap();

    let type_id = session.register_type(&ticker_descriptor()).unwrap();
    session
        .publish(
            type_id,
            "GBPUSD",
            Ticker {
                pair: Guarded::new(Pair { bid: 41, ask: 42 }),
            },
        )
        .unwrap();

    let observer = Observer::connect_in("flat", dir.path()).unwrap();
    let object = observer.find_object("GBPUSD").unwrap();
    let view = observer.get(&object).unwrap();

    assert_eq!(view.field("pair.bid").unwrap().read_u64().unwrap(), 41);
    assert_eq!(view.field("pair.ask").unwrap().read_u64().unwrap(), 42);

    // Chained indexing is equivalent to the dotted path
    let chained = view.field("pair").unwrap().field("ask").unwrap();
    assert_eq!(chained.read_u64().unwrap(), 42);
}
