//! Command scheduler: a fixed-size worker pool draining a shared task queue,
//! with a per-task handle a caller can block on for the result.
//!
//! Mirrors `process.schedule.TaskScheduler` and `process.command_task.CommandTask`:
//! a `Queue` of callables drained by a semaphore-bounded number of worker
//! threads, each task signaling completion through its own event. Here the
//! worker count bounds concurrency directly (no separate semaphore object is
//! needed once the channel is shared by a fixed pool), and each task's
//! "event" is the `mpsc` channel its handle waits on.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A handle to a submitted task's eventual result. Dropping it without
/// calling `wait` abandons the result (the task still runs to completion).
pub struct TaskHandle<T> {
    label: String,
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task completes, returning its result. Panics if the
    /// worker thread running it panicked instead of returning.
    pub fn wait(self) -> T {
        self.receiver
            .recv()
            .unwrap_or_else(|_| panic!("task {} never produced a result", self.label))
    }
}

/// A pool of worker threads draining one shared task queue.
pub struct Scheduler {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns `worker_count` worker threads, each looping on the shared
    /// queue until the scheduler is dropped.
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("fatsim-worker-{id}"))
                    .spawn(move || loop {
                        let job = {
                            let queue = receiver.lock().unwrap();
                            queue.recv()
                        };
                        match job {
                            Ok(job) => job(),
                            Err(_) => {
                                log::debug!("worker {id} shutting down, queue closed");
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn scheduler worker thread")
            })
            .collect();

        Scheduler {
            sender: Some(sender),
            workers,
        }
    }

    /// Queues `task` under `label` (used only for logging and panic
    /// messages) and returns a handle to its result.
    pub fn submit<F, T>(&self, label: impl Into<String>, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        let (result_tx, result_rx) = mpsc::channel();
        let task_label = label.clone();
        let job: Job = Box::new(move || {
            log::debug!("running task {task_label}");
            let result = task();
            // A closed receiver (handle dropped) is not an error here.
            let _ = result_tx.send(result);
        });

        self.sender
            .as_ref()
            .expect("scheduler sender dropped before shutdown")
            .send(job)
            .expect("scheduler queue closed before task could be submitted");

        TaskHandle {
            label,
            receiver: result_rx,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Dropping the sender unblocks every worker's `recv()` with an
        // error, so each thread exits its loop and can be joined.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
