use std::thread::{self, JoinHandle};

/// A boxed unit of compile work, handed to a persistent worker thread over
/// `crossbeam-channel` (the same channel crate the teacher's asset loader
/// and render queue use for cross-thread work handoff).
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shader/pipeline compiler worker pool (§5 "Shader compilation is offloaded
/// to a worker pool of N threads (N configurable, default 0 =
/// synchronous)"). At-most-one-build-per-key (§4.8, §8 property 3) is
/// enforced by [`gvl_cache::ShaderCache`] itself; this pool only decides
/// which thread physically runs the build closure the cache hands it.
pub struct CompilerWorkerPool {
    sender: Option<crossbeam_channel::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl CompilerWorkerPool {
    /// `worker_count == 0` runs every job synchronously on the calling
    /// thread, matching the configuration default.
    pub fn new(worker_count: usize) -> Self {
        if worker_count == 0 {
            return CompilerWorkerPool {
                sender: None,
                workers: Vec::new(),
                worker_count: 0,
            };
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..worker_count)
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("gvl-compiler-{index}"))
                    .spawn(move || {
                        for job in receiver {
                            job();
                        }
                    })
                    .expect("failed to spawn compiler worker thread")
            })
            .collect();

        CompilerWorkerPool {
            sender: Some(sender),
            workers,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Runs `f` to completion, either on the calling thread (pool disabled)
    /// or on one of the pool's worker threads, blocking the caller until it
    /// finishes. The caller already holds whatever serialises concurrent
    /// builds of the same key (§4.8) -- this call only moves the work off
    /// (or keeps it on) the calling thread.
    pub fn run_blocking<T: Send + 'static>(&self, f: impl FnOnce() -> T + Send + 'static) -> T {
        match &self.sender {
            None => f(),
            Some(sender) => {
                let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
                let job: Job = Box::new(move || {
                    let _ = reply_tx.send(f());
                });
                sender
                    .send(job)
                    .expect("compiler worker pool's channel is still open while workers are alive");
                reply_rx
                    .recv()
                    .expect("compiler worker never replied before its thread exited")
            }
        }
    }
}

/// Dropping the pool closes the job channel (workers exit their `for job in
/// receiver` loop once it disconnects) and joins every worker thread --
/// §9's "a device-destroy drains its worker pool before removing the
/// entry".
impl Drop for CompilerWorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn synchronous_pool_runs_on_the_calling_thread() {
        let pool = CompilerWorkerPool::new(0);
        let calling_thread = thread::current().id();
        let seen = pool.run_blocking(move || thread::current().id());
        assert_eq!(seen, calling_thread);
    }

    #[test]
    fn threaded_pool_runs_off_the_calling_thread_and_returns_the_result() {
        let pool = CompilerWorkerPool::new(2);
        let calling_thread = thread::current().id();
        let seen = pool.run_blocking(move || thread::current().id());
        assert_ne!(seen, calling_thread);
        assert_eq!(pool.worker_count(), 2);
    }

    #[test]
    fn many_jobs_all_complete_exactly_once() {
        let pool = CompilerWorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let counter = counter.clone();
            pool.run_blocking(move || counter.fetch_add(1, Ordering::SeqCst));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }
}
