//! Memory Statistics Tool
//!
//! Drives the global allocator, the ownership handles and a MemPool through
//! representative workloads, then dumps the allocator report and the call-site
//! ledger.
//!
//! Run with: cargo run -p void_memstat
//!       or: cargo run --bin memstat
//!
//! Settings come from `memory.toml` (or `$VOID_MEMORY_CONFIG`) and the
//! `VOID_MEMORY_*` environment variables.

mod scenarios;

use void_memory::{global, MemoryConfig};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = MemoryConfig::load();
    log::info!(
        "Heap capacity {} bytes, pool size {} bytes, {} reports",
        config.heap_capacity,
        config.pool_size,
        config.report_format
    );

    if let Err(e) = run(&config) {
        log::error!("memstat failed: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &MemoryConfig) -> Result<(), Box<dyn std::error::Error>> {
    global::configure(config)?;

    scenarios::raw_blocks();
    scenarios::handles();
    scenarios::pool(config)?;

    global::dump_memory_usage(config.report_format);
    global::dump_alloc_info();
    Ok(())
}
