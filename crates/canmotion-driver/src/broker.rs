//! 单条总线的帧调度引擎（对外 API）

use crate::builder::BusConfig;
use crate::bus_load::{BusLoadMonitor, BusLoadSample};
use crate::error::DriverError;
use crate::hooks::FrameCallback;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{BusContext, bus_load_loop, reader_loop, writer_loop};
use crate::registry::CanBusSharer;
use crate::tx_buffer::{CanSender, TxBuffer};
use canmotion_can::CanBus;
use canmotion_protocol::{CanFrame, ProtocolError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 停止时等待每个线程退出的上限
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join，超时后它继续存在，进程退出时回收
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 帧调度引擎
///
/// 独占读/写线程与出站缓冲。节点通过 [`register`](Self::register) 加入，
/// 获得共享的出站委托；入站帧在读线程中按节点 ID 分发。
///
/// # Example
///
/// ```
/// use canmotion_can::MockBus;
/// use canmotion_driver::BusBuilder;
/// use std::time::Duration;
///
/// let mut broker = BusBuilder::new()
///     .rx_delay(Duration::from_micros(500))
///     .build(MockBus::new())
///     .unwrap();
/// broker.start().unwrap();
/// assert!(broker.is_running());
/// broker.stop().unwrap();
/// ```
pub struct CanBusBroker {
    ctx: Arc<BusContext>,
    config: BusConfig,
    is_running: Arc<AtomicBool>,
    rx_thread: Option<JoinHandle<()>>,
    tx_thread: Option<JoinHandle<()>>,
    load_thread: Option<JoinHandle<()>>,
    /// 串行化注册（读线程读取的分发表是复制后整体替换的）
    register_lock: Mutex<()>,
}

impl CanBusBroker {
    /// 创建调度引擎（不启动线程）
    ///
    /// 配置了波特率时立即下发到总线；配置了统计周期时按总线当前波特率创建负载监视器。
    pub fn new(mut bus: Box<dyn CanBus>, config: BusConfig) -> Result<Self, DriverError> {
        config.validate()?;

        if let Some(bitrate) = config.bitrate {
            bus.set_bitrate(bitrate)?;
        }

        let bus_load = match config.bus_load_period {
            Some(period) => {
                let bitrate = bus.bitrate()?;
                Some(Arc::new(BusLoadMonitor::new(bitrate, period)))
            },
            None => None,
        };

        let mut ctx = BusContext::new(bus, config.tx_buffer_size);
        ctx.bus_load = bus_load;

        Ok(Self {
            ctx: Arc::new(ctx),
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            rx_thread: None,
            tx_thread: None,
            load_thread: None,
            register_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // ========================================================================
    // 节点管理
    // ========================================================================

    /// 注册节点，并把共享的出站委托交给它
    ///
    /// 可在线程运行期间调用，新分发表在下一个读周期生效。
    pub fn register(&self, node: Arc<dyn CanBusSharer>) -> Result<(), DriverError> {
        let _guard = self.register_lock.lock();

        let mut registry = (**self.ctx.registry.load()).clone();
        registry.register(node.clone())?;
        self.ctx.registry.store(Arc::new(registry));

        node.register_sender(self.sender());
        debug!("Registered node 0x{:02X}", node.id());
        Ok(())
    }

    /// 出站委托（所有节点共享同一个缓冲）
    pub fn sender(&self) -> Arc<dyn CanSender> {
        self.ctx.tx_buffer.clone()
    }

    pub fn tx_buffer(&self) -> &Arc<TxBuffer> {
        &self.ctx.tx_buffer
    }

    /// 已注册节点（按注册顺序）
    pub fn nodes(&self) -> Vec<Arc<dyn CanBusSharer>> {
        self.ctx.registry.load().nodes().to_vec()
    }

    /// 在总线句柄上安装所有已注册 ID 的接收过滤
    pub fn add_filters(&self) -> Result<(), DriverError> {
        let ids = self.ctx.registry.load().ids();
        let mut bus = self.ctx.bus.lock();
        for id in ids {
            bus.add_filter(id)?;
        }
        Ok(())
    }

    /// 移除所有接收过滤
    pub fn clear_filters(&self) -> Result<(), DriverError> {
        self.ctx.bus.lock().clear_filters()?;
        Ok(())
    }

    /// 依次初始化所有节点，返回全部结果的逻辑与
    ///
    /// 某个节点失败不会跳过后续节点。需要先 [`start`](Self::start)，否则 SDO 无法往返。
    pub fn initialize_nodes(&self) -> bool {
        let mut ok = true;
        for node in self.nodes() {
            if !node.initialize() {
                warn!("Node 0x{:02X} failed to initialize", node.id());
                ok = false;
            }
        }
        ok
    }

    /// 依次下线所有节点，返回全部结果的逻辑与
    pub fn finalize_nodes(&self) -> bool {
        let mut ok = true;
        for node in self.nodes() {
            if !node.finalize() {
                warn!("Node 0x{:02X} failed to finalize", node.id());
                ok = false;
            }
        }
        ok
    }

    // ========================================================================
    // 线程生命周期
    // ========================================================================

    /// 启动读/写线程（以及配置了统计周期时的负载线程）
    pub fn start(&mut self) -> Result<(), DriverError> {
        if self.is_running() {
            return Err(DriverError::AlreadyRunning);
        }
        // 上一次运行可能因致命错误提前结束，先回收残留线程
        self.join_threads();
        self.is_running.store(true, Ordering::Release);

        let rx = {
            let (ctx, config, running) =
                (self.ctx.clone(), self.config.clone(), self.is_running.clone());
            thread::Builder::new()
                .name("canmotion-rx".into())
                .spawn(move || reader_loop(ctx, config, running))
        };
        let rx = match rx {
            Ok(handle) => handle,
            Err(e) => {
                self.is_running.store(false, Ordering::Release);
                return Err(DriverError::ThreadSpawn(format!("RX: {e}")));
            },
        };
        self.rx_thread = Some(rx);

        let tx = {
            let (ctx, config, running) =
                (self.ctx.clone(), self.config.clone(), self.is_running.clone());
            thread::Builder::new()
                .name("canmotion-tx".into())
                .spawn(move || writer_loop(ctx, config, running))
        };
        match tx {
            Ok(handle) => self.tx_thread = Some(handle),
            Err(e) => {
                self.is_running.store(false, Ordering::Release);
                self.join_threads();
                return Err(DriverError::ThreadSpawn(format!("TX: {e}")));
            },
        }

        if let Some(monitor) = &self.ctx.bus_load {
            let (monitor, running) = (monitor.clone(), self.is_running.clone());
            let load = thread::Builder::new()
                .name("canmotion-busload".into())
                .spawn(move || bus_load_loop(monitor, running));
            match load {
                Ok(handle) => self.load_thread = Some(handle),
                Err(e) => {
                    self.is_running.store(false, Ordering::Release);
                    self.join_threads();
                    return Err(DriverError::ThreadSpawn(format!("bus load: {e}")));
                },
            }
        }

        info!("CAN bus dispatch threads started");
        Ok(())
    }

    /// 停止所有线程（协作式），等待退出
    pub fn stop(&mut self) -> Result<(), DriverError> {
        if !self.is_running() && self.rx_thread.is_none() && self.tx_thread.is_none() {
            return Err(DriverError::NotRunning);
        }
        self.is_running.store(false, Ordering::Release);

        let failed = self.join_threads();
        if let Some(name) = failed {
            return Err(DriverError::JoinTimeout(name));
        }
        info!("CAN bus dispatch threads stopped");
        Ok(())
    }

    /// join 所有线程，返回第一个未能按时退出的线程名
    fn join_threads(&mut self) -> Option<&'static str> {
        let mut failed = None;
        let handles = [
            ("RX", self.rx_thread.take()),
            ("TX", self.tx_thread.take()),
            ("Bus load", self.load_thread.take()),
        ];
        for (name, handle) in handles {
            if let Some(handle) = handle
                && handle.join_timeout(JOIN_TIMEOUT).is_err()
            {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    name, JOIN_TIMEOUT
                );
                if failed.is_none() {
                    failed = Some(name);
                }
            }
        }
        failed
    }

    /// 调度线程是否在运行
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 检查线程存活状态，返回 `(rx_alive, tx_alive)`
    pub fn check_health(&self) -> (bool, bool) {
        let rx_alive = self.rx_thread.as_ref().is_some_and(|h| !h.is_finished());
        let tx_alive = self.tx_thread.as_ref().is_some_and(|h| !h.is_finished());
        (rx_alive, tx_alive)
    }

    pub fn is_healthy(&self) -> bool {
        let (rx_alive, tx_alive) = self.check_health();
        rx_alive && tx_alive
    }

    // ========================================================================
    // 观测
    // ========================================================================

    /// 获取性能指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 最近一个统计周期的负载，未启用统计时返回 `None`
    pub fn bus_load(&self) -> Option<BusLoadSample> {
        self.ctx.bus_load.as_ref().map(|m| m.sample())
    }

    /// 添加帧钩子
    pub fn add_hook(&self, callback: Arc<dyn FrameCallback>) {
        self.ctx.hooks.write().add_callback(callback);
    }

    // ========================================================================
    // 原始帧
    // ========================================================================

    /// 注入一帧原始数据（`id ≤ 0x7FF`，1..=8 字节）
    pub fn send_remote(&self, id: u16, data: &[u8]) -> Result<(), DriverError> {
        if data.is_empty() {
            return Err(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0,
            }
            .into());
        }
        let frame = CanFrame::try_new(id, data)?;

        if !self.is_running() {
            return Err(DriverError::NotRunning);
        }
        if !self.ctx.tx_buffer.prepare(frame) {
            return Err(DriverError::BufferFull {
                capacity: self.ctx.tx_buffer.capacity(),
            });
        }
        Ok(())
    }
}

impl Drop for CanBusBroker {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        self.join_threads();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BusBuilder;
    use canmotion_can::MockBus;
    use std::sync::atomic::AtomicUsize;

    struct EchoNode {
        id: u8,
        extra: Vec<u8>,
        received: AtomicUsize,
        sender: Mutex<Option<Arc<dyn CanSender>>>,
    }

    impl EchoNode {
        fn new(id: u8, extra: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                id,
                extra,
                received: AtomicUsize::new(0),
                sender: Mutex::new(None),
            })
        }
    }

    impl CanBusSharer for EchoNode {
        fn id(&self) -> u8 {
            self.id
        }

        fn additional_ids(&self) -> Vec<u8> {
            self.extra.clone()
        }

        fn register_sender(&self, sender: Arc<dyn CanSender>) {
            *self.sender.lock() = Some(sender);
        }

        fn notify_message(&self, _frame: &CanFrame) -> bool {
            self.received.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn initialize(&self) -> bool {
            self.id != 0x03
        }

        fn finalize(&self) -> bool {
            true
        }
    }

    fn fast_builder() -> BusBuilder {
        BusBuilder::new()
            .rx_delay(Duration::from_micros(200))
            .tx_delay(Duration::from_micros(200))
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut broker = fast_builder().build(MockBus::new()).unwrap();
        assert!(!broker.is_running());
        assert!(matches!(broker.stop(), Err(DriverError::NotRunning)));

        broker.start().unwrap();
        assert!(broker.is_running());
        assert!(broker.is_healthy());
        assert!(matches!(broker.start(), Err(DriverError::AlreadyRunning)));

        broker.stop().unwrap();
        assert!(!broker.is_running());
        assert_eq!(broker.check_health(), (false, false));

        // 可以重新启动
        broker.start().unwrap();
        assert!(broker.is_running());
    }

    #[test]
    fn test_register_hands_out_sender_and_rejects_duplicates() {
        let broker = fast_builder().build(MockBus::new()).unwrap();
        let node = EchoNode::new(0x05, vec![0x45]);
        broker.register(node.clone()).unwrap();
        assert!(node.sender.lock().is_some());

        let clash = EchoNode::new(0x45, vec![]);
        assert!(matches!(
            broker.register(clash),
            Err(DriverError::DuplicateNode { id: 0x45 })
        ));
        assert_eq!(broker.nodes().len(), 1);
    }

    #[test]
    fn test_filters_follow_registered_ids() {
        let bus = MockBus::new();
        let broker = fast_builder().build(bus.clone()).unwrap();
        broker.register(EchoNode::new(0x02, vec![0x22])).unwrap();
        broker.register(EchoNode::new(0x01, vec![])).unwrap();

        broker.add_filters().unwrap();
        let mut filters = bus.filters();
        filters.sort_unstable();
        assert_eq!(filters, vec![0x01, 0x02, 0x22]);

        broker.clear_filters().unwrap();
        assert!(bus.filters().is_empty());
    }

    #[test]
    fn test_initialize_nodes_reduces_with_and() {
        let broker = fast_builder().build(MockBus::new()).unwrap();
        broker.register(EchoNode::new(0x01, vec![])).unwrap();
        broker.register(EchoNode::new(0x03, vec![])).unwrap();
        broker.register(EchoNode::new(0x04, vec![])).unwrap();
        assert!(!broker.initialize_nodes());
        assert!(broker.finalize_nodes());
    }

    #[test]
    fn test_send_remote_validation() {
        let bus = MockBus::new();
        let mut broker = fast_builder().build(bus.clone()).unwrap();

        assert!(matches!(
            broker.send_remote(0x123, &[1]),
            Err(DriverError::NotRunning)
        ));

        broker.start().unwrap();
        assert!(matches!(
            broker.send_remote(0x800, &[1]),
            Err(DriverError::Protocol(_))
        ));
        assert!(broker.send_remote(0x123, &[]).is_err());
        assert!(broker.send_remote(0x123, &[0; 9]).is_err());

        broker.send_remote(0x123, &[0xAA, 0xBB]).unwrap();
        thread::sleep(Duration::from_millis(30));
        broker.stop().unwrap();

        let written = bus.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].id, 0x123);
        assert_eq!(written[0].data_slice(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_bitrate_and_bus_load_setup() {
        let bus = MockBus::new();
        let broker = fast_builder()
            .bitrate(250_000)
            .bus_load_period(Duration::from_millis(100))
            .build(bus.clone())
            .unwrap();
        let mut handle = bus.clone();
        assert_eq!(handle.bitrate().unwrap(), 250_000);
        assert_eq!(broker.bus_load(), Some(BusLoadSample::default()));

        let plain = fast_builder().build(MockBus::new()).unwrap();
        assert_eq!(plain.bus_load(), None);
    }
}
