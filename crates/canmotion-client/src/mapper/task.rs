//! 一次分发的任务集合
//!
//! 生命周期：创建 → `add` → `dispatch` → 丢弃。所有任务都会执行（不短路），结果按逻辑与合并。

use super::pool::WorkerPool;
use crossbeam_channel::unbounded;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{error, warn};

pub type Job = Box<dyn FnOnce() -> bool + Send + 'static>;

fn run_job(job: Job) -> bool {
    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(result) => result,
        Err(_) => {
            error!("Joint operation panicked");
            false
        },
    }
}

/// 分发策略
pub enum Task {
    /// 在调用线程上按加入顺序执行
    Sequential { jobs: Vec<Job> },
    /// 提交到线程池，等待全部完成
    Parallel { pool: Arc<WorkerPool>, jobs: Vec<Job> },
}

impl Task {
    pub fn sequential() -> Self {
        Task::Sequential { jobs: Vec::new() }
    }

    pub fn parallel(pool: Arc<WorkerPool>) -> Self {
        Task::Parallel {
            pool,
            jobs: Vec::new(),
        }
    }

    pub fn add(&mut self, job: impl FnOnce() -> bool + Send + 'static) {
        match self {
            Task::Sequential { jobs } | Task::Parallel { jobs, .. } => jobs.push(Box::new(job)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Task::Sequential { jobs } | Task::Parallel { jobs, .. } => jobs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 执行全部任务，返回逻辑与
    pub fn dispatch(self) -> bool {
        match self {
            Task::Sequential { jobs } => {
                jobs.into_iter().fold(true, |ok, job| run_job(job) && ok)
            },
            Task::Parallel { pool, jobs } => {
                let (tx, rx) = unbounded();
                let mut ok = true;
                let mut submitted = 0usize;

                for job in jobs {
                    let tx = tx.clone();
                    if pool.submit(move || {
                        let _ = tx.send(run_job(job));
                    }) {
                        submitted += 1;
                    } else {
                        warn!("Worker pool rejected a joint operation");
                        ok = false;
                    }
                }
                drop(tx);

                for _ in 0..submitted {
                    match rx.recv() {
                        Ok(result) => ok &= result,
                        Err(_) => {
                            error!("Worker pool dropped a joint operation");
                            return false;
                        },
                    }
                }
                ok
            },
        }
    }
}
