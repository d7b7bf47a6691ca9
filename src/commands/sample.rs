//! Sample command implementation.
//!
//! Runs the engine from the terminal and prints each domain record, so rate
//! domains can be checked without starting the server. Rates need a
//! baseline, so the first round reports zero throughput and IOPS.

use monix::engine::{Domain, Engine};
use monix::source::ProcfsSource;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;

/// Samples the given domains `iterations` times.
pub fn command_sample(
    domains: &[String],
    iterations: usize,
    interval_ms: u64,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let domains: Vec<Domain> = if domains.is_empty() {
        Domain::ALL.to_vec()
    } else {
        domains
            .iter()
            .map(|d| d.parse::<Domain>())
            .collect::<Result<_, _>>()?
    };

    // Every round must recompute, so the cache window is disabled
    let mut engine_config = config.engine_config();
    engine_config.cache_ttl = Duration::ZERO;
    let engine = Engine::new(Arc::new(ProcfsSource::new()), engine_config);

    println!("🧪 Monix - Sample Mode");
    println!("======================");

    for iteration in 1..=iterations {
        println!("\n🔄 Iteration {}/{}:", iteration, iterations);

        for domain in &domains {
            let start = Instant::now();
            match engine.compute(*domain) {
                Ok(snapshot) => {
                    println!(
                        "   ├─ {} ({:.2}ms)",
                        domain,
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                    println!("   │  {}", serde_json::to_string(&snapshot)?);
                }
                Err(e) => println!("   ├─ ❌ {}: {}", domain, e),
            }
        }

        let stats = engine.stats();
        println!(
            "   └─ 📊 {} rate streams, {} tracked pids",
            stats.rate_streams, stats.tracked_pids
        );

        if iteration < iterations {
            thread::sleep(Duration::from_millis(interval_ms));
        }
    }

    println!("\n✅ Sampling completed");
    Ok(())
}
