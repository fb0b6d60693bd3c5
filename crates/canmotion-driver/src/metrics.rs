//! 总线调度性能指标
//!
//! 原子计数器，读/写线程与调用方线程均可无锁更新与读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 总线调度实时指标
///
/// # 使用示例
///
/// ```rust
/// use canmotion_driver::BusMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(BusMetrics::default());
/// metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.rx_frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// RX 读取的总帧数
    pub rx_frames_total: AtomicU64,

    /// RX 成功分发到节点的帧数
    pub rx_frames_dispatched: AtomicU64,

    /// RX 无匹配节点而丢弃的帧数
    pub rx_frames_unmatched: AtomicU64,

    /// TX 被总线接受的总帧数
    pub tx_frames_total: AtomicU64,

    /// TX 成功入队的帧数
    pub tx_frames_enqueued: AtomicU64,

    /// TX 缓冲区满导致入队失败的次数
    pub tx_enqueue_rejected: AtomicU64,

    /// TX 部分写入次数（总线只接受了前缀）
    pub tx_partial_writes: AtomicU64,

    /// TX 因 bus-off 丢弃的帧数
    pub tx_frames_discarded: AtomicU64,

    /// 读错误次数
    pub read_errors: AtomicU64,

    /// 写错误次数
    pub write_errors: AtomicU64,
}

impl BusMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 各计数器分别原子读取，计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            rx_frames_dispatched: self.rx_frames_dispatched.load(Ordering::Relaxed),
            rx_frames_unmatched: self.rx_frames_unmatched.load(Ordering::Relaxed),
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            tx_frames_enqueued: self.tx_frames_enqueued.load(Ordering::Relaxed),
            tx_enqueue_rejected: self.tx_enqueue_rejected.load(Ordering::Relaxed),
            tx_partial_writes: self.tx_partial_writes.load(Ordering::Relaxed),
            tx_frames_discarded: self.tx_frames_discarded.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.rx_frames_total.store(0, Ordering::Relaxed);
        self.rx_frames_dispatched.store(0, Ordering::Relaxed);
        self.rx_frames_unmatched.store(0, Ordering::Relaxed);
        self.tx_frames_total.store(0, Ordering::Relaxed);
        self.tx_frames_enqueued.store(0, Ordering::Relaxed);
        self.tx_enqueue_rejected.store(0, Ordering::Relaxed);
        self.tx_partial_writes.store(0, Ordering::Relaxed);
        self.tx_frames_discarded.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.write_errors.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变，用于读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub rx_frames_dispatched: u64,
    pub rx_frames_unmatched: u64,
    pub tx_frames_total: u64,
    pub tx_frames_enqueued: u64,
    pub tx_enqueue_rejected: u64,
    pub tx_partial_writes: u64,
    pub tx_frames_discarded: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

impl MetricsSnapshot {
    /// 分发率（百分比），`rx_frames_total` 为 0 时返回 0.0
    pub fn dispatch_rate(&self) -> f64 {
        if self.rx_frames_total == 0 {
            return 0.0;
        }
        (self.rx_frames_dispatched as f64 / self.rx_frames_total as f64) * 100.0
    }

    /// 入队失败率（百分比）
    pub fn rejection_rate(&self) -> f64 {
        let attempts = self.tx_frames_enqueued + self.tx_enqueue_rejected;
        if attempts == 0 {
            return 0.0;
        }
        (self.tx_enqueue_rejected as f64 / attempts as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_default() {
        let snapshot = BusMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = BusMetrics::new();
        metrics.rx_frames_total.fetch_add(100, Ordering::Relaxed);
        metrics.tx_frames_discarded.fetch_add(5, Ordering::Relaxed);
        assert_eq!(metrics.snapshot().rx_frames_total, 100);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_concurrent_access() {
        let metrics = Arc::new(BusMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.tx_frames_enqueued.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().tx_frames_enqueued, 4000);
    }

    #[test]
    fn test_rates() {
        let snapshot = MetricsSnapshot {
            rx_frames_total: 200,
            rx_frames_dispatched: 150,
            tx_frames_enqueued: 90,
            tx_enqueue_rejected: 10,
            ..Default::default()
        };
        assert!((snapshot.dispatch_rate() - 75.0).abs() < 1e-9);
        assert!((snapshot.rejection_rate() - 10.0).abs() < 1e-9);
        assert_eq!(MetricsSnapshot::default().dispatch_rate(), 0.0);
    }
}
