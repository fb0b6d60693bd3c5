//! 调度引擎集成测试
//!
//! 读线程按节点 ID 分发、写线程刷新出站缓冲、钩子与指标。

mod common;

use canmotion_can::MockBus;
use canmotion_sdk::driver::{
    CanBusSharer, CanSender, Direction, DriverError, FrameCallback, FrameDumpHook, TxBuffer,
};
use canmotion_sdk::protocol::{CanFrame, DriveState, STATUSWORD_STATE_MASK, parse_statusword};
use parking_lot::Mutex;
use proptest::prelude::*;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

/// 记录收到的帧
struct Recorder {
    id: u8,
    seen: Mutex<Vec<CanFrame>>,
}

impl Recorder {
    fn new(id: u8) -> Arc<Self> {
        Arc::new(Self {
            id,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen_ids(&self) -> Vec<u16> {
        self.seen.lock().iter().map(|f| f.id).collect()
    }
}

impl CanBusSharer for Recorder {
    fn id(&self) -> u8 {
        self.id
    }

    fn register_sender(&self, _sender: Arc<dyn CanSender>) {}

    fn notify_message(&self, frame: &CanFrame) -> bool {
        self.seen.lock().push(*frame);
        true
    }

    fn initialize(&self) -> bool {
        true
    }

    fn finalize(&self) -> bool {
        true
    }
}

#[test]
#[serial]
fn test_dispatch_by_node_id() {
    let bus = MockBus::new();
    let mut broker = common::broker(&bus);
    let a = Recorder::new(0x01);
    let b = Recorder::new(0x02);
    broker.register(a.clone()).unwrap();
    broker.register(b.clone()).unwrap();
    broker.start().unwrap();

    for id in [0x181u16, 0x282, 0x381, 0x703, 0x582] {
        bus.push_inbound(CanFrame::new(id, &[0x00]));
    }
    assert!(common::wait_for(|| broker.metrics().rx_frames_total == 5));

    assert_eq!(a.seen_ids(), vec![0x181, 0x381]);
    assert_eq!(b.seen_ids(), vec![0x282, 0x582]);
    let metrics = broker.metrics();
    assert_eq!(metrics.rx_frames_dispatched, 4);
    assert_eq!(metrics.rx_frames_unmatched, 1);
}

#[test]
#[serial]
fn test_duplicate_registration_rejected() {
    let bus = MockBus::new();
    let broker = common::broker(&bus);
    broker.register(Recorder::new(0x07)).unwrap();
    assert!(matches!(
        broker.register(Recorder::new(0x07)),
        Err(DriverError::DuplicateNode { id: 0x07 })
    ));
    assert_eq!(broker.nodes().len(), 1);
}

#[test]
#[serial]
fn test_send_remote_through_writer() {
    let bus = MockBus::new();
    let mut broker = common::broker(&bus);

    assert!(matches!(
        broker.send_remote(0x601, &[0x40, 0x41, 0x60, 0x00]),
        Err(DriverError::NotRunning)
    ));
    broker.start().unwrap();
    assert!(broker.send_remote(0x800, &[0x01]).is_err());
    assert!(broker.send_remote(0x601, &[]).is_err());

    broker.send_remote(0x601, &[0x40, 0x41, 0x60, 0x00]).unwrap();
    broker.send_remote(0x000, &[0x01, 0x00]).unwrap();
    assert!(common::wait_for(|| bus.written().len() == 2));

    let written = bus.written();
    assert_eq!(written[0].id, 0x601);
    assert_eq!(written[0].len, 4);
    assert_eq!(written[1].id, 0x000);
    assert_eq!(broker.tx_buffer().pending(), 0);
}

#[test]
#[serial]
fn test_hooks_see_both_directions() {
    let bus = MockBus::new();
    let mut broker = common::broker(&bus);
    let (hook, rx) = FrameDumpHook::new(64);
    broker.add_hook(Arc::new(hook) as Arc<dyn FrameCallback>);
    broker.start().unwrap();

    bus.push_inbound(CanFrame::new(0x18F, &[0x37, 0x02]));
    broker.send_remote(0x20F, &[0x0F, 0x00]).unwrap();

    let mut records = Vec::new();
    assert!(common::wait_for(|| {
        records.extend(rx.try_iter());
        records.len() == 2
    }));
    assert!(
        records
            .iter()
            .any(|r| r.direction == Direction::Rx && r.frame.id == 0x18F)
    );
    assert!(
        records
            .iter()
            .any(|r| r.direction == Direction::Tx && r.frame.id == 0x20F)
    );
}

#[test]
#[serial]
fn test_bus_off_discards_pending() {
    let bus = MockBus::new();
    let mut broker = common::broker(&bus);
    bus.set_bus_off(true);
    broker.start().unwrap();

    for i in 0..5u8 {
        broker.send_remote(0x200 + i as u16, &[i]).unwrap();
    }
    assert!(common::wait_for(|| broker.metrics().tx_frames_discarded == 5));
    assert_eq!(broker.tx_buffer().pending(), 0);
    assert!(bus.written().is_empty());

    // 恢复后新帧正常发送，旧帧不会重发
    bus.set_bus_off(false);
    broker.send_remote(0x20A, &[0xAA]).unwrap();
    assert!(common::wait_for(|| bus.written().len() == 1));
    assert_eq!(bus.written()[0].id, 0x20A);
}

#[test]
#[serial]
fn test_write_error_keeps_frames() {
    let bus = MockBus::new();
    let mut broker = common::broker(&bus);
    bus.fail_next_write();
    broker.start().unwrap();

    broker.send_remote(0x201, &[0x01]).unwrap();
    broker.send_remote(0x202, &[0x02]).unwrap();
    assert!(common::wait_for(|| bus.written().len() == 2));

    let ids: Vec<u16> = bus.written().iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0x201, 0x202]);
    assert_eq!(broker.metrics().write_errors, 1);
}

#[test]
#[serial]
fn test_stop_and_restart() {
    let bus = MockBus::new();
    let mut broker = common::broker(&bus);
    broker.start().unwrap();
    assert!(matches!(broker.start(), Err(DriverError::AlreadyRunning)));
    broker.stop().unwrap();
    assert!(!broker.is_running());

    broker.start().unwrap();
    broker.send_remote(0x201, &[0x01]).unwrap();
    assert!(common::wait_for(|| bus.written().len() == 1));
    std::thread::sleep(Duration::from_millis(5));
    assert!(broker.is_healthy());
}

fn frames(n: usize) -> Vec<CanFrame> {
    (0..n)
        .map(|i| CanFrame::new(0x200 + i as u16, &[i as u8]))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 部分写入后缓冲区保留未发送的尾部，顺序不变
    #[test]
    fn prop_partial_write_preserves_tail(total in 1usize..32, accepted in 0usize..40) {
        let buffer = TxBuffer::new(64);
        let input = frames(total);
        for frame in &input {
            prop_assert!(buffer.prepare(*frame));
        }

        let bus = MockBus::new();
        bus.limit_next_write(accepted);
        let mut handle = bus.clone();
        let outcome = buffer.flush(&mut handle);

        let sent = accepted.min(total);
        prop_assert_eq!(outcome.sent, sent);
        prop_assert_eq!(outcome.pending, total - sent);
        prop_assert_eq!(bus.written(), input[..sent].to_vec());
        prop_assert_eq!(buffer.snapshot(), input[sent..].to_vec());
    }

    /// 状态字解析是全函数，只取决于状态位
    #[test]
    fn prop_parse_statusword_total(statusword in any::<u16>()) {
        let state = parse_statusword(statusword);
        prop_assert_eq!(state, parse_statusword(statusword));
        prop_assert_eq!(state, parse_statusword(statusword & STATUSWORD_STATE_MASK));
        if statusword & 0x004F == 0x0008 {
            prop_assert_eq!(state, DriveState::Fault);
        }
    }
}
