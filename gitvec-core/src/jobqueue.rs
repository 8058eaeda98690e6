//! Async job queue: a single-worker FIFO giving long-running indexing
//! jobs a bounded-concurrency execution context. Non-persistent — a
//! crash drops all queue state, by design.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub kind: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub state: JobState,
    pub progress: HashMap<String, String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
}

type Task = Box<dyn FnOnce(&dyn Fn(HashMap<String, String>)) -> Result<String, String> + Send>;

enum WorkItem {
    Run { id: u64, task: Task },
}

/// Only queued jobs are cancellable; once a worker picks a job up it runs
/// to completion or failure.
pub struct JobQueue {
    jobs: Arc<Mutex<HashMap<u64, Job>>>,
    next_id: Mutex<u64>,
    sender: Sender<WorkItem>,
    cancelled: Arc<Mutex<std::collections::HashSet<u64>>>,
    _worker: JoinHandle<()>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver): (Sender<WorkItem>, Receiver<WorkItem>) = unbounded();
        let jobs: Arc<Mutex<HashMap<u64, Job>>> = Arc::new(Mutex::new(HashMap::new()));
        let cancelled = Arc::new(Mutex::new(std::collections::HashSet::new()));

        let worker_jobs = Arc::clone(&jobs);
        let worker_cancelled = Arc::clone(&cancelled);
        let worker = std::thread::spawn(move || {
            for item in receiver {
                let WorkItem::Run { id, task } = item;

                if worker_cancelled.lock().unwrap().remove(&id) {
                    continue;
                }

                {
                    let mut jobs = worker_jobs.lock().unwrap();
                    if let Some(job) = jobs.get_mut(&id) {
                        job.state = JobState::Running;
                        job.started_at = Some(now_iso());
                    }
                }

                let jobs_for_progress = Arc::clone(&worker_jobs);
                let on_progress = move |progress: HashMap<String, String>| {
                    if let Some(job) = jobs_for_progress.lock().unwrap().get_mut(&id) {
                        job.progress = progress;
                    }
                };

                let outcome = task(&on_progress);

                let mut jobs = worker_jobs.lock().unwrap();
                if let Some(job) = jobs.get_mut(&id) {
                    job.completed_at = Some(now_iso());
                    match outcome {
                        Ok(result) => {
                            job.state = JobState::Completed;
                            job.result = Some(result);
                        }
                        Err(err) => {
                            job.state = JobState::Failed;
                            job.error = Some(err);
                        }
                    }
                }
            }
        });

        Self { jobs, next_id: Mutex::new(1), sender, cancelled, _worker: worker }
    }

    /// `POST /register`: enqueues `task` under `kind`, returning the new
    /// job's id immediately.
    pub fn register<F>(&self, kind: &str, metadata: HashMap<String, String>, task: F) -> u64
    where
        F: FnOnce(&dyn Fn(HashMap<String, String>)) -> Result<String, String> + Send + 'static,
    {
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let job = Job {
            id,
            kind: kind.to_string(),
            created_at: now_iso(),
            started_at: None,
            completed_at: None,
            state: JobState::Queued,
            progress: HashMap::new(),
            result: None,
            error: None,
            metadata,
        };
        self.jobs.lock().unwrap().insert(id, job);

        // channel send never blocks (unbounded); a full mailbox here would
        // indicate a stuck worker, not backpressure to apply.
        let _ = self.sender.send(WorkItem::Run { id, task: Box::new(task) });
        id
    }

    /// `GET /job/{id}`.
    pub fn get(&self, id: u64) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// `DELETE /job/{id}`: only effective while the job is still queued.
    pub fn cancel(&self, id: u64) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id) else { return false };
        if job.state != JobState::Queued {
            return false;
        }
        job.state = JobState::Cancelled;
        job.completed_at = Some(now_iso());
        self.cancelled.lock().unwrap().insert(id);
        true
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn job_runs_to_completion() {
        let queue = JobQueue::new();
        let id = queue.register("index", HashMap::new(), |_progress| Ok("done".to_string()));

        let mut job = queue.get(id).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while job.state != JobState::Completed && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            job = queue.get(id).unwrap();
        }

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result, Some("done".to_string()));
    }

    #[test]
    fn job_failure_is_captured() {
        let queue = JobQueue::new();
        let id = queue.register("index", HashMap::new(), |_progress| Err("boom".to_string()));

        let mut job = queue.get(id).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while job.state != JobState::Failed && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            job = queue.get(id).unwrap();
        }

        assert_eq!(job.error, Some("boom".to_string()));
    }

    #[test]
    fn cancel_only_affects_queued_jobs() {
        let queue = JobQueue::new();
        let (tx, rx) = mpsc::channel::<()>();
        let id = queue.register("index", HashMap::new(), move |_progress| {
            let _ = rx.recv_timeout(Duration::from_secs(2));
            Ok("done".to_string())
        });

        // give the worker a moment to pick the job up before cancelling
        std::thread::sleep(Duration::from_millis(20));
        let cancelled = queue.cancel(id);
        let _ = tx.send(());

        assert!(!cancelled); // already running, not queued
        let job = queue.get(id).unwrap();
        assert_ne!(job.state, JobState::Cancelled);
    }
}
