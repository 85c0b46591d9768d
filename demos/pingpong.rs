// Raw byte-level round trips over a vector-mode segment, both sides in one
// process on separate threads.
//
//   cargo run --example pingpong -- [instances] [iterations]
use dmxp_gymlink::{Handoff, InterfaceBuilder, MessageInterface};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let instances: u32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(4);
    let iterations: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let name = format!("dmxp_pingpong_{}", std::process::id());

    let open = |builder: InterfaceBuilder| -> Arc<MessageInterface> {
        match builder
            .with_segment_name(&name)
            .with_vector(instances)
            .with_wait_timeout(Duration::from_secs(5))
            .build()
        {
            Ok(interface) => Arc::new(interface),
            Err(e) => {
                eprintln!("pingpong: {e}");
                std::process::exit(1);
            }
        }
    };
    let engine = open(InterfaceBuilder::new().creator().engine());
    let agent = open(InterfaceBuilder::new().attacher().agent());

    let start = Instant::now();
    let mut handles = Vec::new();
    for index in 0..instances {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || -> Result<(), String> {
            let mut pair = engine.get_interface(index).map_err(|e| e.to_string())?;
            for i in 0..iterations {
                let mut msg = [0u8; 8];
                msg[..4].copy_from_slice(&index.to_le_bytes());
                msg[4..].copy_from_slice(&i.to_le_bytes());
                if pair.send(&msg).map_err(|e| e.to_string())? == Handoff::Finished {
                    return Ok(());
                }
                match pair.recv().map_err(|e| e.to_string())? {
                    Some(reply) if reply == msg => {}
                    Some(reply) => return Err(format!("engine instance {index}: bad echo {reply:?}")),
                    None => return Ok(()),
                }
            }
            Ok(())
        }));

        let agent = Arc::clone(&agent);
        handles.push(thread::spawn(move || -> Result<(), String> {
            let mut pair = agent.get_interface(index).map_err(|e| e.to_string())?;
            for _ in 0..iterations {
                let Some(msg) = pair.recv().map_err(|e| e.to_string())? else {
                    return Ok(());
                };
                if pair.send(&msg).map_err(|e| e.to_string())?.is_finished() {
                    return Ok(());
                }
            }
            Ok(())
        }));
    }

    let mut failed = false;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("pingpong: {e}");
                failed = true;
            }
            Err(_) => failed = true,
        }
    }
    let elapsed = start.elapsed();
    let total = u64::from(instances) * u64::from(iterations);
    println!(
        "{total} round trips over {instances} instances in {elapsed:.2?} ({:.0} ns/round trip)",
        elapsed.as_nanos() as f64 / total.max(1) as f64
    );
    if failed {
        std::process::exit(1);
    }
}
