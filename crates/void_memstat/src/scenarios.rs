//! Workloads run by the tool

use void_memory::{global, make_shared, make_unique, MemoryConfig, MemoryDescriptor};
use void_structures::{MemPool, PoolError, PoolHandle};

/// Sizes spanning every leg of the global allocator
const RAW_SIZES: [usize; 6] = [16, 112, 128, 112, 4096, 256 * 1024];

/// Allocate a spread of raw blocks and free them newest first
pub fn raw_blocks() {
    let blocks: Vec<MemoryDescriptor> = RAW_SIZES.iter().map(|&size| global::allocate(size)).collect();
    for block in &blocks {
        log::debug!("Raw block {:?}", block);
    }

    for block in blocks.into_iter().rev() {
        // SAFETY: each block came from the global allocator and is freed once
        unsafe { global::deallocate(block) };
    }

    // Freed 112 byte blocks are now parked; these come straight back
    let recycled = global::allocate(112);
    unsafe { global::deallocate(recycled) };
    log::info!("Raw block workload done");
}

/// Copy and move shared handles, then drop a unique one
pub fn handles() {
    let mut original = make_shared(10i32);
    let copy = original.clone();
    log::info!("Shared value {} with {} handles", *copy, original.use_count());
    drop(copy);

    let moved = std::mem::take(&mut original);
    log::info!(
        "Moved handle holds {} (count {}), original valid: {}",
        *moved,
        moved.use_count(),
        original.is_valid()
    );

    let unique = make_unique(vec![0u8; 64]);
    log::info!("Unique handle holds {} bytes", unique.len());
}

/// Fill a pool with integers, free every other one, then the rest
pub fn pool(config: &MemoryConfig) -> Result<(), PoolError> {
    let pool = MemPool::from_config(config)?;
    let mut handles: Vec<PoolHandle<'_, i32>> = Vec::new();

    for value in 0..100 {
        match pool.try_allocate(value) {
            Ok(handle) => handles.push(handle),
            Err(e @ PoolError::Exhausted { .. }) => {
                log::warn!("Stopped after {} values: {}", handles.len(), e);
                break;
            }
            Err(e) => return Err(e),
        }
    }
    log::info!("Pool filled: {}", pool.stats());

    for handle in handles.iter_mut().step_by(2) {
        drop(std::mem::take(handle));
    }
    log::info!("Every other value released: {}", pool.stats());

    handles.clear();
    log::info!("All values released: {}", pool.stats());
    Ok(())
}
