//! Demo observer: connects to the `quote_producer` session and prints every
//! field of every live object on change
//!
//! Run with `cargo run --example quote_observer` while the producer runs.

use std::time::Duration;

use memglass::{Observer, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut observer = Observer::connect("demo")?;
    println!(
        "Connected to 'demo' (producer pid {}, sequence {})",
        observer.producer_pid(),
        observer.sequence()
    );

    let mut last_seen = 0;
    loop {
        let seq = observer.sequence();
        if seq != last_seen {
            observer.refresh()?;
            last_seen = seq;
        }

        for object in observer.objects() {
            let view = observer.get(&object)?;
            print!("{} ({})", object.label, object.type_name);
            let fields = view.type_info().fields.clone();
            for field in &fields {
                if field.is_nested || field.array_len > 0 {
                    continue;
                }
                let proxy = view.field(&field.name)?;
                let value = match field.size {
                    8 => proxy.read_u64().map(|v| v.to_string()),
                    4 => proxy.read_u32().map(|v| v.to_string()),
                    2 => proxy.read::<u16>().map(|v| v.to_string()),
                    _ => proxy.read_u8().map(|v| v.to_string()),
                };
                match value {
                    Ok(v) => print!("  {}={} [{}]", field.name, v, field.atomicity.as_str()),
                    Err(_) => print!("  {}=<invalid>", field.name),
                }
            }
            println!();
        }

        std::thread::sleep(Duration::from_millis(500));
    }
}
