//! Seeded thread pools for the parallel phases.
//!
//! Parallel contraction, parallel label propagation, and parallel k-way FM
//! all run inside a rayon pool built by [`build_seeded_pool`]: each worker's
//! thread-local `SmallRng` is seeded deterministically from the run seed and
//! the worker index, so a run with a fixed seed and thread count replays
//! exactly. Every parallel section is scoped and joins before the next phase
//! begins; no long-lived background threads exist.

use rand::rngs::SmallRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::cell::{Cell, RefCell};

use crate::error::PartitionError;
use crate::rng;

thread_local! {
    static TLS_RNG: RefCell<Option<SmallRng>> = const { RefCell::new(None) };
    static TLS_WORKER_IDX: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Build a rayon pool of `num_threads` workers, each seeded from
/// `(global_seed, worker index)`.
pub fn build_seeded_pool(
    global_seed: u64,
    num_threads: usize,
) -> Result<ThreadPool, PartitionError> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .start_handler(move |idx| {
            TLS_RNG.with(|cell| {
                *cell.borrow_mut() = Some(rng::worker_rng(global_seed, idx));
            });
            TLS_WORKER_IDX.with(|c| c.set(Some(idx)));
        })
        .exit_handler(|_| {
            TLS_RNG.with(|cell| *cell.borrow_mut() = None);
            TLS_WORKER_IDX.with(|c| c.set(None));
        })
        .build()
        .map_err(|e| PartitionError::InvalidArguments(format!("cannot build thread pool: {e}")))
}

/// Borrow the worker's thread-local RNG. Must run inside a seeded pool.
pub fn with_thread_rng<T>(f: impl FnOnce(&mut SmallRng) -> T) -> T {
    TLS_RNG.with(|cell| {
        let mut opt = cell.borrow_mut();
        let rng = opt
            .as_mut()
            .expect("with_thread_rng() called outside a seeded pool");
        f(rng)
    })
}

/// Current worker index, if inside a seeded pool.
pub fn worker_index() -> Option<usize> {
    TLS_WORKER_IDX.with(|c| c.get())
}
