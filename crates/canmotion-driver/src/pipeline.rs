//! 调度线程循环
//!
//! 每条总线两个周期线程（读 / 写），外加可选的负载统计线程。
//! 读写线程共享同一个总线句柄，每个周期先休眠配置的间隔，把 CPU 让给对方。

use crate::builder::BusConfig;
use crate::bus_load::BusLoadMonitor;
use crate::hooks::HookManager;
use crate::metrics::BusMetrics;
use crate::registry::HandlerRegistry;
use crate::tx_buffer::TxBuffer;
use arc_swap::ArcSwap;
use canmotion_can::CanBus;
use canmotion_protocol::CanFrame;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace};

/// 负载统计线程单次休眠的最大时长（保证停止响应及时）
const BUS_LOAD_POLL_SLICE: Duration = Duration::from_millis(50);

/// 调度线程共享的上下文
pub struct BusContext {
    /// 总线句柄（读写线程竞争使用）
    pub bus: Arc<Mutex<Box<dyn CanBus>>>,
    /// 出站帧缓冲
    pub tx_buffer: Arc<TxBuffer>,
    /// 节点分发表（注册阶段替换，读线程只读）
    pub registry: ArcSwap<HandlerRegistry>,
    /// 帧钩子
    pub hooks: RwLock<HookManager>,
    pub metrics: Arc<BusMetrics>,
    /// 负载监视器（仅在配置了统计周期时存在）
    pub bus_load: Option<Arc<BusLoadMonitor>>,
}

impl BusContext {
    pub fn new(bus: Box<dyn CanBus>, tx_capacity: usize) -> Self {
        let metrics = Arc::new(BusMetrics::new());
        Self {
            bus: Arc::new(Mutex::new(bus)),
            tx_buffer: Arc::new(TxBuffer::with_metrics(tx_capacity, metrics.clone())),
            registry: ArcSwap::from_pointee(HandlerRegistry::new()),
            hooks: RwLock::new(HookManager::new()),
            metrics,
            bus_load: None,
        }
    }

    /// 处理读到的一帧：负载统计、钩子、分发
    fn handle_inbound(&self, frame: &CanFrame, registry: &HandlerRegistry) {
        self.metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);

        if let Some(monitor) = &self.bus_load {
            monitor.record_rx(frame);
        }

        // 钩子被修改时不阻塞读线程，本帧跳过
        if let Some(hooks) = self.hooks.try_read() {
            hooks.trigger_all(frame);
        }

        if registry.dispatch(frame) {
            self.metrics.rx_frames_dispatched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.rx_frames_unmatched.fetch_add(1, Ordering::Relaxed);
            trace!("RX thread: no handler for frame 0x{:03X}", frame.id);
        }
    }
}

/// 读线程主循环
///
/// 每个周期：休眠 `rx_delay` → 非阻塞读取 → 按节点 ID 分发。
/// 传输错误只记录日志并视为本周期无数据，致命错误（设备丢失）终止循环。
pub fn reader_loop(ctx: Arc<BusContext>, config: BusConfig, is_running: Arc<AtomicBool>) {
    let mut buffer = vec![CanFrame::default(); config.rx_buffer_size];

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: stop requested, exiting");
            break;
        }

        spin_sleep::sleep(config.rx_delay);

        let result = {
            let mut bus = ctx.bus.lock();
            bus.read(&mut buffer)
        };

        let count = match result {
            Ok(count) => count.min(buffer.len()),
            Err(e) => {
                ctx.metrics.read_errors.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    error!("RX thread: fatal CAN error, stopping: {}", e);
                    is_running.store(false, Ordering::Release);
                    break;
                }
                error!("RX thread: CAN read error: {}", e);
                continue;
            },
        };

        if count == 0 {
            continue;
        }

        // 一个周期内使用同一份分发表快照
        let registry = ctx.registry.load();
        for frame in &buffer[..count] {
            ctx.handle_inbound(frame, &registry);
        }
    }
}

/// 写线程主循环
///
/// 每个周期：休眠 `tx_delay` → 刷新出站缓冲（见 [`TxBuffer::flush_with`]）。
pub fn writer_loop(ctx: Arc<BusContext>, config: BusConfig, is_running: Arc<AtomicBool>) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("TX thread: stop requested, exiting");
            break;
        }

        spin_sleep::sleep(config.tx_delay);

        if ctx.tx_buffer.pending() == 0 {
            continue;
        }

        let mut bus = ctx.bus.lock();
        let hooks = ctx.hooks.try_read();
        ctx.tx_buffer.flush_with(&mut **bus, |frame| {
            if let Some(hooks) = &hooks {
                hooks.trigger_all_sent(frame);
            }
            if let Some(monitor) = &ctx.bus_load {
                monitor.record_tx(frame);
            }
        });
    }
}

/// 负载统计线程主循环
///
/// 按周期调用 [`BusLoadMonitor::tick`]；休眠被切成小片，以便及时响应停止。
pub fn bus_load_loop(monitor: Arc<BusLoadMonitor>, is_running: Arc<AtomicBool>) {
    let period = monitor.period();

    'outer: loop {
        let mut remaining = period;
        while !remaining.is_zero() {
            if !is_running.load(Ordering::Acquire) {
                break 'outer;
            }
            let slice = remaining.min(BUS_LOAD_POLL_SLICE);
            spin_sleep::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }

        let sample = monitor.tick();
        debug!(
            "Bus load: rx {:.1}%, tx {:.1}%",
            sample.rx_load * 100.0,
            sample.tx_load * 100.0
        );
    }
    trace!("Bus load thread: exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CanBusSharer;
    use crate::tx_buffer::CanSender;
    use canmotion_can::MockBus;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct CountingNode {
        id: u8,
        count: AtomicUsize,
    }

    impl CanBusSharer for CountingNode {
        fn id(&self) -> u8 {
            self.id
        }

        fn register_sender(&self, _sender: Arc<dyn CanSender>) {}

        fn notify_message(&self, _frame: &CanFrame) -> bool {
            self.count.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn initialize(&self) -> bool {
            true
        }

        fn finalize(&self) -> bool {
            true
        }
    }

    fn fast_config() -> BusConfig {
        BusConfig {
            rx_delay: Duration::from_micros(200),
            tx_delay: Duration::from_micros(200),
            ..BusConfig::default()
        }
    }

    #[test]
    fn test_reader_loop_dispatches_and_drops_unmatched() {
        let bus = MockBus::new();
        let ctx = Arc::new(BusContext::new(Box::new(bus.clone()), 16));
        let node = Arc::new(CountingNode {
            id: 0x0F,
            count: AtomicUsize::new(0),
        });
        let mut registry = HandlerRegistry::new();
        registry.register(node.clone()).unwrap();
        ctx.registry.store(Arc::new(registry));

        bus.push_inbound(CanFrame::new(0x18F, &[0x37, 0x02]));
        bus.push_inbound(CanFrame::new(0x181, &[0x00]));
        bus.push_inbound(CanFrame::new(0x58F, &[0x43; 8]));

        let is_running = Arc::new(AtomicBool::new(true));
        let handle = {
            let (ctx, running) = (ctx.clone(), is_running.clone());
            thread::spawn(move || reader_loop(ctx, fast_config(), running))
        };

        thread::sleep(Duration::from_millis(50));
        is_running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert_eq!(node.count.load(Ordering::SeqCst), 2);
        let snapshot = ctx.metrics.snapshot();
        assert_eq!(snapshot.rx_frames_total, 3);
        assert_eq!(snapshot.rx_frames_dispatched, 2);
        assert_eq!(snapshot.rx_frames_unmatched, 1);
    }

    #[test]
    fn test_reader_loop_survives_transient_error() {
        let bus = MockBus::new();
        bus.fail_next_read();
        let ctx = Arc::new(BusContext::new(Box::new(bus.clone()), 16));
        let is_running = Arc::new(AtomicBool::new(true));

        let handle = {
            let (ctx, running) = (ctx.clone(), is_running.clone());
            thread::spawn(move || reader_loop(ctx, fast_config(), running))
        };
        thread::sleep(Duration::from_millis(30));

        // 瞬时错误后线程仍在运行
        assert!(!handle.is_finished());
        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
        assert_eq!(ctx.metrics.snapshot().read_errors, 1);
    }

    #[test]
    fn test_writer_loop_flushes_in_order() {
        let bus = MockBus::new();
        let ctx = Arc::new(BusContext::new(Box::new(bus.clone()), 16));
        for i in 0..5u8 {
            assert!(ctx.tx_buffer.prepare(CanFrame::new(0x600 + i as u16, &[i])));
        }

        let is_running = Arc::new(AtomicBool::new(true));
        let handle = {
            let (ctx, running) = (ctx.clone(), is_running.clone());
            thread::spawn(move || writer_loop(ctx, fast_config(), running))
        };
        thread::sleep(Duration::from_millis(30));
        is_running.store(false, Ordering::Release);
        handle.join().unwrap();

        let ids: Vec<u16> = bus.written().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x600, 0x601, 0x602, 0x603, 0x604]);
        assert_eq!(ctx.tx_buffer.pending(), 0);
    }

    #[test]
    fn test_bus_load_loop_exits_promptly() {
        let monitor = Arc::new(BusLoadMonitor::new(1_000_000, Duration::from_secs(10)));
        let is_running = Arc::new(AtomicBool::new(true));
        let handle = {
            let (monitor, running) = (monitor.clone(), is_running.clone());
            thread::spawn(move || bus_load_loop(monitor, running))
        };
        thread::sleep(Duration::from_millis(20));
        is_running.store(false, Ordering::Release);
        thread::sleep(Duration::from_millis(150));
        assert!(handle.is_finished());
        handle.join().unwrap();
    }
}
