//! 有界工作线程池
//!
//! N 个具名线程共享一个有界 `crossbeam-channel` 队列。`Drop` 关闭队列并等待所有线程退出。
//! 单个任务 panic 只记录日志，线程继续取下一个任务。

use crossbeam_channel::{Sender, bounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use tracing::{error, trace};

type PoolJob = Box<dyn FnOnce() + Send + 'static>;

/// 每个线程对应的队列深度
const QUEUE_DEPTH_PER_THREAD: usize = 16;

pub struct WorkerPool {
    sender: Option<Sender<PoolJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 启动 `size` 个工作线程
    ///
    /// 任一线程创建失败时，已创建的线程会被回收并返回错误。
    pub fn new(size: usize) -> std::io::Result<Self> {
        if size == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "worker pool needs at least one thread",
            ));
        }

        let (tx, rx) = bounded::<PoolJob>(size * QUEUE_DEPTH_PER_THREAD);
        let mut pool = Self {
            sender: Some(tx),
            workers: Vec::with_capacity(size),
        };

        for i in 0..size {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("canmotion-worker-{}", i))
                .spawn(move || {
                    // 队列关闭且清空后退出
                    while let Ok(job) = rx.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("Worker job panicked");
                        }
                    }
                    trace!("Worker thread exiting");
                })?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// 提交一个任务，队列满时阻塞；池已关闭时返回 `false`
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}
