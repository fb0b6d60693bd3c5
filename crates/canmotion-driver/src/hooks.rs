//! 钩子系统（Hook System）
//!
//! 在读/写线程收发帧时触发自定义回调，例如把总线流量转储到外部通道。
//!
//! # 使用示例
//!
//! ```rust
//! use canmotion_driver::hooks::{FrameCallback, FrameDumpHook, HookManager};
//! use canmotion_protocol::CanFrame;
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (hook, rx) = FrameDumpHook::new(1024);
//! hooks.add_callback(Arc::new(hook) as Arc<dyn FrameCallback>);
//!
//! // 读线程中
//! hooks.trigger_all(&CanFrame::new(0x18F, &[0x37, 0x02]));
//! assert_eq!(rx.try_recv().unwrap().frame.id, 0x18F);
//! ```

use canmotion_protocol::CanFrame;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// 帧回调 Trait
///
/// 回调运行在读/写线程中，必须是非阻塞的：禁止 I/O 与长时间持锁，
/// 推荐通过 `try_send` 把数据转交给其他线程。
pub trait FrameCallback: Send + Sync {
    /// 当读线程收到帧时调用
    fn on_frame_received(&self, frame: &CanFrame);

    /// 当帧被总线接受后调用（可选）
    ///
    /// 仅在写入成功后触发，缓冲中被丢弃或尚未发送的帧不会出现在这里。
    fn on_frame_sent(&self, frame: &CanFrame) {
        let _ = frame;
    }
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的，需要外部同步（通常通过 `RwLock<HookManager>`）。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn FrameCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// 添加回调
    pub fn add_callback(&mut self, callback: Arc<dyn FrameCallback>) {
        self.callbacks.push(callback);
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// 触发所有接收回调
    pub fn trigger_all(&self, frame: &CanFrame) {
        for callback in self.callbacks.iter() {
            callback.on_frame_received(frame);
        }
    }

    /// 触发所有发送回调
    pub fn trigger_all_sent(&self, frame: &CanFrame) {
        for callback in self.callbacks.iter() {
            callback.on_frame_sent(frame);
        }
    }
}

// ============================================================================
// 帧转储
// ============================================================================

/// 帧方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// 转储记录
#[derive(Debug, Clone)]
pub struct DumpedFrame {
    pub direction: Direction,
    pub frame: CanFrame,
    /// 相对钩子创建时刻的时间（微秒）
    pub elapsed_us: u64,
}

/// 帧转储钩子
///
/// 把收发的帧写入有界通道，通道满时丢弃新帧并计数，不阻塞调度线程。
pub struct FrameDumpHook {
    tx: Sender<DumpedFrame>,
    epoch: Instant,
    dropped_frames: Arc<AtomicU64>,
}

impl FrameDumpHook {
    /// 创建转储钩子，返回 `(hook, rx)`
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<DumpedFrame>) {
        let (tx, rx) = bounded(capacity);
        let hook = Self {
            tx,
            epoch: Instant::now(),
            dropped_frames: Arc::new(AtomicU64::new(0)),
        };
        (hook, rx)
    }

    /// 因通道满而丢弃的帧数
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// 丢帧计数器（钩子交给 `HookManager` 后仍可监控）
    pub fn dropped_frames(&self) -> &Arc<AtomicU64> {
        &self.dropped_frames
    }

    #[inline]
    fn dump(&self, direction: Direction, frame: &CanFrame) {
        let record = DumpedFrame {
            direction,
            frame: *frame,
            elapsed_us: self.epoch.elapsed().as_micros() as u64,
        };
        if self.tx.try_send(record).is_err() {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl FrameCallback for FrameDumpHook {
    #[inline]
    fn on_frame_received(&self, frame: &CanFrame) {
        self.dump(Direction::Rx, frame);
    }

    #[inline]
    fn on_frame_sent(&self, frame: &CanFrame) {
        self.dump(Direction::Tx, frame);
    }
}
