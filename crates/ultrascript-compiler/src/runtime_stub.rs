//! Minimal goroutine + lock stand-in for the runtime this compiler targets
//! (spec §5 "Concurrency & resource model").
//!
//! Not a specified deliverable: the real `__goroutine_spawn_v2`/
//! `__lock_acquire_v2`/`__lock_release_v2` entries live in a runtime this
//! crate never implements (spec §1, §4.6 "no entry's behavior is
//! implemented in this crate"). This module exists only so scenario 5 of
//! §8 (shared-counter goroutines) has something real to run against in
//! tests, built on the teacher's concurrency stack: a `crossbeam-deque`
//! work-stealing pool and a `parking_lot::Mutex`-backed lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_deque::{Injector, Stealer, Worker};
use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size work-stealing pool spawning `Job`s (the goroutine
/// stand-in's scheduler).
pub struct GoroutinePool {
    injector: Arc<Injector<Job>>,
    stealers: Vec<Stealer<Job>>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl GoroutinePool {
    /// Spin up `worker_count` worker threads (defaults to `num_cpus::get()`
    /// when zero is passed).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = if worker_count == 0 { num_cpus::get().max(1) } else { worker_count };
        let injector = Arc::new(Injector::new());
        let mut workers = Vec::with_capacity(worker_count);
        let mut stealers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let worker = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers.push(worker);
        }
        let shutdown = Arc::new(AtomicBool::new(false));

        let handles = workers
            .into_iter()
            .map(|worker| {
                let injector = Arc::clone(&injector);
                let stealers = stealers.clone();
                let shutdown = Arc::clone(&shutdown);
                std::thread::spawn(move || Self::run_worker(worker, injector, stealers, shutdown))
            })
            .collect();

        Self { injector, stealers, shutdown, handles }
    }

    fn run_worker(
        local: Worker<Job>,
        injector: Arc<Injector<Job>>,
        stealers: Vec<Stealer<Job>>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            let job = local
                .pop()
                .or_else(|| std::iter::repeat_with(|| injector.steal_batch_and_pop(&local).success()).find_map(|j| j))
                .or_else(|| Self::steal_from_others(&stealers));
            match job {
                Some(job) => job(),
                None => {
                    if shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Steal from a random victim first, then sweep the rest in order
    /// (teacher convention: randomized start avoids every idle worker
    /// contending on stealer 0).
    fn steal_from_others(stealers: &[Stealer<Job>]) -> Option<Job> {
        use rand::Rng;

        if stealers.is_empty() {
            return None;
        }
        let start = rand::thread_rng().gen_range(0..stealers.len());
        for i in 0..stealers.len() {
            let stealer = &stealers[(start + i) % stealers.len()];
            loop {
                match stealer.steal() {
                    crossbeam_deque::Steal::Success(job) => return Some(job),
                    crossbeam_deque::Steal::Empty => break,
                    crossbeam_deque::Steal::Retry => continue,
                }
            }
        }
        None
    }

    /// Spawn a goroutine (`__goroutine_spawn_v2`'s runtime-side behavior).
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.injector.push(Box::new(job));
    }

    /// Block until every worker has observed shutdown and exited. Used by
    /// tests after all spawned jobs are expected to have completed.
    pub fn shutdown_and_join(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// `__lock_acquire_v2`/`__lock_release_v2`'s runtime-side behavior: a
/// simple mutual-exclusion lock around an `i64` counter, matching the
/// shape scenario 5 of §8 exercises.
pub struct SharedCounter {
    value: Mutex<i64>,
}

impl SharedCounter {
    pub fn new(initial: i64) -> Self {
        Self { value: Mutex::new(initial) }
    }

    /// Acquire the lock, run `f` against the current value, release.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut i64) -> R) -> R {
        let mut guard = self.value.lock();
        f(&mut guard)
    }

    pub fn get(&self) -> i64 {
        *self.value.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn goroutines_increment_shared_counter_without_racing() {
        let pool = GoroutinePool::new(4);
        let counter = Arc::new(SharedCounter::new(0));
        let barrier = Arc::new(Barrier::new(1));
        let done = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            let done = Arc::clone(&done);
            let _barrier = Arc::clone(&barrier);
            pool.spawn(move || {
                counter.with_lock(|v| *v += 1);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        while done.load(Ordering::SeqCst) < 100 {
            std::thread::yield_now();
        }
        assert_eq!(counter.get(), 100);
        pool.shutdown_and_join();
    }
}
