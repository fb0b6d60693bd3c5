//! 出站帧缓冲
//!
//! 多个调用方线程通过 [`CanSender::prepare`] 入队，写线程周期性 [`TxBuffer::flush`]。
//!
//! 刷新策略：
//! - 总线 bus-off（或查询失败）：丢弃全部待发帧，不重试
//! - 写入出错：保留全部待发帧，下个周期重试
//! - 部分写入：未发送的尾部移到缓冲区头部，保持相对顺序

use crate::metrics::BusMetrics;
use canmotion_can::CanBus;
use canmotion_protocol::CanFrame;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, trace, warn};

/// 出站帧委托
///
/// 节点对象只通过这个窄接口发送帧，不接触总线句柄。
pub trait CanSender: Send + Sync {
    /// 入队一帧，缓冲区满时返回 `false`
    fn prepare(&self, frame: CanFrame) -> bool;
}

/// 单次刷新的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushOutcome {
    /// 被总线接受的帧数
    pub sent: usize,
    /// 因 bus-off 丢弃的帧数
    pub discarded: usize,
    /// 刷新后仍在缓冲区中的帧数
    pub pending: usize,
}

/// 容量受限的出站帧缓冲（互斥保护）
pub struct TxBuffer {
    frames: Mutex<Vec<CanFrame>>,
    capacity: usize,
    metrics: Arc<BusMetrics>,
}

impl TxBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::with_metrics(capacity, Arc::new(BusMetrics::new()))
    }

    pub fn with_metrics(capacity: usize, metrics: Arc<BusMetrics>) -> Self {
        Self {
            frames: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            metrics,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前待发帧数
    pub fn pending(&self) -> usize {
        self.frames.lock().len()
    }

    /// 待发帧的副本（按发送顺序）
    pub fn snapshot(&self) -> Vec<CanFrame> {
        self.frames.lock().clone()
    }

    /// 清空缓冲区，返回被清除的帧数
    pub fn clear(&self) -> usize {
        let mut frames = self.frames.lock();
        let count = frames.len();
        frames.clear();
        count
    }

    /// 刷新到总线
    pub fn flush(&self, bus: &mut dyn CanBus) -> FlushOutcome {
        self.flush_with(bus, |_| {})
    }

    /// 刷新到总线，对每个被接受的帧调用 `on_sent`
    pub fn flush_with<F>(&self, bus: &mut dyn CanBus, mut on_sent: F) -> FlushOutcome
    where
        F: FnMut(&CanFrame),
    {
        let mut frames = self.frames.lock();
        if frames.is_empty() {
            return FlushOutcome::default();
        }

        let bus_off = match bus.bus_off() {
            Ok(off) => off,
            Err(e) => {
                error!("TX thread: failed to query bus state: {}", e);
                true
            },
        };

        if bus_off {
            let discarded = frames.len();
            frames.clear();
            self.metrics
                .tx_frames_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            warn!("TX thread: bus off, discarded {} pending frames", discarded);
            return FlushOutcome {
                sent: 0,
                discarded,
                pending: 0,
            };
        }

        let requested = frames.len();
        let sent = match bus.write(&frames) {
            Ok(sent) => sent.min(requested),
            Err(e) => {
                error!("TX thread: CAN write error: {}", e);
                self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
                return FlushOutcome {
                    sent: 0,
                    discarded: 0,
                    pending: requested,
                };
            },
        };

        for frame in &frames[..sent] {
            on_sent(frame);
        }

        if sent < requested {
            self.metrics.tx_partial_writes.fetch_add(1, Ordering::Relaxed);
            trace!(
                "TX thread: partial write, {} of {} frames accepted",
                sent, requested
            );
        }

        // 未发送的尾部前移，保持顺序
        frames.drain(..sent);
        self.metrics
            .tx_frames_total
            .fetch_add(sent as u64, Ordering::Relaxed);

        FlushOutcome {
            sent,
            discarded: 0,
            pending: frames.len(),
        }
    }
}

impl CanSender for TxBuffer {
    fn prepare(&self, frame: CanFrame) -> bool {
        let mut frames = self.frames.lock();
        if frames.len() >= self.capacity {
            self.metrics
                .tx_enqueue_rejected
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                "TX buffer full ({} frames), dropping frame 0x{:03X}",
                self.capacity, frame.id
            );
            return false;
        }
        frames.push(frame);
        self.metrics
            .tx_frames_enqueued
            .fetch_add(1, Ordering::Relaxed);
        true
    }
}
