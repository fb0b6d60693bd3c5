//! 带超时的阻塞等待原语
//!
//! SDO 客户端与 CiA 402 状态机共用：写入方 [`StateObserver::update`] 后唤醒所有等待者，
//! 等待方用谓词判断是否满足，满足前最多阻塞到截止时间。

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 条件变量 + 谓词 + 截止时间
#[derive(Debug, Default)]
pub struct StateObserver<T> {
    value: Mutex<T>,
    changed: Condvar,
}

impl<T> StateObserver<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            changed: Condvar::new(),
        }
    }

    /// 修改状态并唤醒所有等待者
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut value = self.value.lock();
            f(&mut value)
        };
        self.changed.notify_all();
        result
    }

    /// 在锁内读取状态
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.lock())
    }

    /// 阻塞直到谓词返回 `Some`，或超时返回 `None`
    ///
    /// 谓词在锁内执行，可以原子地消费状态（例如取走响应）。
    /// 进入时先检查一次，已满足时不阻塞。
    pub fn wait_until<R>(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&mut T) -> Option<R>,
    ) -> Option<R> {
        let deadline = Instant::now() + timeout;
        let mut value = self.value.lock();
        loop {
            if let Some(result) = predicate(&mut value) {
                return Some(result);
            }
            if self.changed.wait_until(&mut value, deadline).timed_out() {
                // 超时瞬间可能刚好被更新
                return predicate(&mut value);
            }
        }
    }
}

impl<T: Clone> StateObserver<T> {
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_satisfied_immediately() {
        let observer = StateObserver::new(5u32);
        let got = observer.wait_until(Duration::ZERO, |v| (*v == 5).then_some(*v));
        assert_eq!(got, Some(5));
    }

    #[test]
    fn test_wait_times_out() {
        let observer = StateObserver::new(0u32);
        let start = Instant::now();
        let got = observer.wait_until(Duration::from_millis(20), |v| (*v > 0).then_some(()));
        assert_eq!(got, None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_woken_by_update() {
        let observer = Arc::new(StateObserver::new(None::<u8>));
        let writer = {
            let observer = observer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                observer.update(|v| *v = Some(42));
            })
        };

        let got = observer.wait_until(Duration::from_secs(2), |v| v.take());
        writer.join().unwrap();
        assert_eq!(got, Some(42));
        // 谓词已消费
        assert_eq!(observer.get(), None);
    }
}
