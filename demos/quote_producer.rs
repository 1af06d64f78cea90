//! Demo producer: publishes a live quote that `quote_observer` can watch
//!
//! Run with `cargo run --example quote_producer`, then start the observer
//! in another terminal.

use std::mem::offset_of;
use std::time::Duration;

use memglass::{
    Atomic, Atomicity, Config, FieldDescriptor, PrimitiveType, Result, Session, TypeDescriptor,
};

#[repr(C)]
struct Quote {
    bid_price: Atomic<i64>,
    ask_price: Atomic<i64>,
    bid_size: u32,
    ask_size: u32,
    ts: Atomic<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let session = Session::create("demo", Config::default())?;
    println!("Session 'demo' created (pid {})", std::process::id());

    let type_id = session.register_type(
        &TypeDescriptor::of::<Quote>("Quote")
            .with_field(
                FieldDescriptor::new(
                    "bid_price",
                    offset_of!(Quote, bid_price) as u32,
                    PrimitiveType::Int64,
                )
                .with_atomicity(Atomicity::Atomic),
            )
            .with_field(
                FieldDescriptor::new(
                    "ask_price",
                    offset_of!(Quote, ask_price) as u32,
                    PrimitiveType::Int64,
                )
                .with_atomicity(Atomicity::Atomic),
            )
            .with_field(FieldDescriptor::new(
                "bid_size",
                offset_of!(Quote, bid_size) as u32,
                PrimitiveType::UInt32,
            ))
            .with_field(FieldDescriptor::new(
                "ask_size",
                offset_of!(Quote, ask_size) as u32,
                PrimitiveType::UInt32,
            ))
            .with_field(
                FieldDescriptor::new("ts", offset_of!(Quote, ts) as u32, PrimitiveType::UInt64)
                    .with_atomicity(Atomicity::Atomic),
            ),
    )?;

    let quote = session.publish(
        type_id,
        "AAPL",
        Quote {
            bid_price: Atomic::new(101_00),
            ask_price: Atomic::new(101_05),
            bid_size: 100,
            ask_size: 200,
            ts: Atomic::new(0),
        },
    )?;

    println!("Publishing quotes; Ctrl+C to stop");
    let quote = unsafe { quote.as_ref() };
    for tick in 0u64.. {
        let mid = 101_00 + (tick % 100) as i64;
        quote.bid_price.store(mid - 2);
        quote.ask_price.store(mid + 3);
        quote.ts.store(tick);
        std::thread::sleep(Duration::from_millis(100));
    }

    Ok(())
}
