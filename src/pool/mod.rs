//! Fixed-size worker pool with two map-reduce primitives and a
//! barrier/section abstraction (§4.2).
//!
//! The shared task queue and its wakeup monitor follow the
//! `Mutex`-protected-state-plus-`Condvar`-monitor pattern used by the
//! parallel branch-and-bound solver this module's concurrency shape is
//! grounded on: a `parking_lot::Mutex` guards the queue, a
//! `parking_lot::Condvar` parks idle workers, and a stop flag lets shutdown
//! broadcast every parked worker awake instead of joining them one at a
//! time.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

type PanicPayload = Box<dyn Any + Send + 'static>;
type Job = Box<dyn FnOnce(usize) + Send>;

struct Queue {
    jobs: Mutex<VecDeque<Job>>,
    monitor: Condvar,
    stop: AtomicBool,
}

/// A fixed-size collection of worker threads draining one shared FIFO task
/// queue.
pub struct Pool {
    shared: Arc<Queue>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Spawns `size` worker threads. `size` is clamped to at least 1.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Queue {
            jobs: Mutex::new(VecDeque::new()),
            monitor: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let workers = (0..size)
            .map(|id| {
                let shared = shared.clone();
                std::thread::spawn(move || Self::worker_loop(shared, id))
            })
            .collect();

        Self { shared, workers }
    }

    fn worker_loop(shared: Arc<Queue>, id: usize) {
        loop {
            let job = {
                let mut jobs = shared.jobs.lock();
                loop {
                    if let Some(job) = jobs.pop_front() {
                        break Some(job);
                    }
                    if shared.stop.load(Ordering::SeqCst) {
                        break None;
                    }
                    shared.monitor.wait(&mut jobs);
                }
            };
            match job {
                Some(job) => job(id),
                None => return,
            }
        }
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    fn dispatch(&self, job: Job) {
        self.shared.jobs.lock().push_back(job);
        self.shared.monitor.notify_one();
    }

    /// Pushes one task and returns a future for its result (or panic).
    pub fn enqueue<F, T>(&self, f: F) -> PoolFuture<T>
    where
        F: FnOnce(usize) -> T + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::new((Mutex::new(None::<Result<T, PanicPayload>>), Condvar::new()));
        let future = PoolFuture { state: state.clone() };

        self.dispatch(Box::new(move |id| {
            let result = catch_unwind(AssertUnwindSafe(|| f(id)));
            *state.0.lock() = Some(result);
            state.1.notify_all();
        }));

        future
    }

    /// Dispatches `N` single-index tasks and blocks until every one
    /// completes. Runs sequentially in the caller when `N <= 1` or the pool
    /// has a single worker.
    pub fn map<F>(&self, n: usize, op: F)
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        if n == 0 {
            return;
        }
        if n <= 1 || self.size() == 1 {
            for i in 0..n {
                op(i, 0);
            }
            return;
        }

        let op = Arc::new(op);
        let mut section = Section::new();
        for i in 0..n {
            let op = op.clone();
            section.push(self.enqueue(move |id| op(i, id)));
        }
        section.block(true);
    }

    /// Dispatches `⌈N/chunk⌉` range tasks of at most `chunk` indices each
    /// and blocks until every one completes.
    pub fn map_chunked<F>(&self, n: usize, chunk: usize, op: F)
    where
        F: Fn(usize, usize, usize) + Send + Sync,
    {
        assert!(chunk > 0, "chunk size must be positive");
        if n == 0 {
            return;
        }
        if n <= chunk || self.size() == 1 {
            op(0, n, 0);
            return;
        }

        let op = Arc::new(op);
        let mut section = Section::new();
        let mut begin = 0;
        while begin < n {
            let end = (begin + chunk).min(n);
            let op = op.clone();
            section.push(self.enqueue(move |id| op(begin, end, id)));
            begin = end;
        }
        section.block(true);
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.monitor.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// A handle to a task's eventual result (or panic payload).
pub struct PoolFuture<T> {
    state: Arc<(Mutex<Option<Result<T, PanicPayload>>>, Condvar)>,
}

impl<T> PoolFuture<T> {
    /// Blocks until the task completes, returning its result or the panic
    /// payload it raised.
    pub fn get(self) -> Result<T, PanicPayload> {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock();
        loop {
            if let Some(result) = guard.take() {
                return result;
            }
            cvar.wait(&mut guard);
        }
    }
}

/// An RAII bundle of futures whose destructor always waits for every
/// pending task, even on the early-exit/panic path.
pub struct Section<T> {
    futures: Vec<PoolFuture<T>>,
    consumed: bool,
}

impl<T> Section<T> {
    pub fn new() -> Self {
        Self {
            futures: Vec::new(),
            consumed: false,
        }
    }

    pub fn push(&mut self, future: PoolFuture<T>) {
        self.futures.push(future);
    }

    /// Waits for every pending task. With `raise = true`, the first panic
    /// payload observed is resumed (re-panicked) on the caller; with
    /// `raise = false` panics are swallowed and missing results are
    /// dropped.
    pub fn block(&mut self, raise: bool) -> Vec<T> {
        self.consumed = true;
        let mut results = Vec::with_capacity(self.futures.len());
        let mut first_panic = None;
        for future in self.futures.drain(..) {
            match future.get() {
                Ok(value) => results.push(value),
                Err(payload) => {
                    if first_panic.is_none() {
                        first_panic = Some(payload);
                    }
                }
            }
        }
        if raise {
            if let Some(payload) = first_panic {
                std::panic::resume_unwind(payload);
            }
        }
        results
    }
}

impl<T> Drop for Section<T> {
    fn drop(&mut self) {
        if !self.consumed {
            self.block(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;

    use super::*;

    #[test]
    fn map_matches_sequential_sum() {
        let pool = Pool::new(4);
        let total = AtomicI64::new(0);
        pool.map(1000, |i, _worker| {
            total.fetch_add(i as i64, Ordering::SeqCst);
        });
        assert_eq!(total.load(Ordering::SeqCst), (0..1000i64).sum::<i64>());
    }

    #[test]
    fn map_chunked_matches_sequential_sum() {
        let pool = Pool::new(4);
        let total = AtomicI64::new(0);
        pool.map_chunked(1024, 7, |begin, end, _worker| {
            let partial: i64 = (begin..end).map(|i| i as i64).sum();
            total.fetch_add(partial, Ordering::SeqCst);
        });
        assert_eq!(total.load(Ordering::SeqCst), (0..1024i64).sum::<i64>());
    }

    #[test]
    fn map_is_consistent_across_pool_sizes() {
        for workers in [1, 4, 8] {
            let pool = Pool::new(workers);
            let total = AtomicI64::new(0);
            pool.map(1024, |i, _| {
                total.fetch_add(i as i64, Ordering::SeqCst);
            });
            assert_eq!(total.load(Ordering::SeqCst), (0..1024i64).sum::<i64>());
        }
    }

    #[test]
    fn enqueue_returns_the_computed_value() {
        let pool = Pool::new(2);
        let future = pool.enqueue(|_id| 2 + 2);
        assert_eq!(future.get().unwrap(), 4);
    }

    #[test]
    fn section_reraises_first_panic_on_block_true() {
        let pool = Pool::new(2);
        let mut section = Section::new();
        section.push(pool.enqueue(|_| -> i32 { panic!("boom") }));
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| section.block(true)));
        assert!(result.is_err());
    }

    #[test]
    fn section_swallows_panics_on_block_false() {
        let pool = Pool::new(2);
        let mut section = Section::new();
        section.push(pool.enqueue(|_| -> i32 { panic!("boom") }));
        section.push(pool.enqueue(|_| 7));
        let results = section.block(false);
        assert_eq!(results, vec![7]);
    }
}
