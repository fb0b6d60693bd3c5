//! Mock 总线（无硬件依赖）
//!
//! [`MockBus`] 是可克隆的句柄：一份交给被测代码（读写线程），另一份留在测试中
//! 注入入站帧、检查出站帧、模拟 bus-off 或部分写入。
//!
//! ```rust
//! use canmotion_can::{CanBus, CanFrame, MockBus};
//!
//! let bus = MockBus::new();
//! // 模拟节点：对任何 SDO 请求回复一帧
//! bus.set_responder(|frame: &CanFrame| {
//!     if frame.id == 0x605 {
//!         vec![CanFrame::new(0x585, &[0x60, 0, 0, 0, 0, 0, 0, 0])]
//!     } else {
//!         Vec::new()
//!     }
//! });
//!
//! let mut handle = bus.clone();
//! handle.write(&[CanFrame::new(0x605, &[0x40])]).unwrap();
//!
//! let mut buf = [CanFrame::default(); 4];
//! assert_eq!(handle.read(&mut buf).unwrap(), 1);
//! assert_eq!(buf[0].id, 0x585);
//! ```

use crate::{CanBus, CanError, CanFrame};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// 出站帧的模拟应答函数，返回值追加到入站队列
pub type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

struct MockState {
    inbound: VecDeque<CanFrame>,
    written: Vec<CanFrame>,
    responder: Option<Responder>,
    bus_off: bool,
    write_limit: Option<usize>,
    fail_next_read: bool,
    fail_next_write: bool,
    bitrate: u32,
    filters: BTreeSet<u8>,
    write_calls: usize,
}

/// 可脚本化的内存总线
#[derive(Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    /// 默认 1 Mbit/s，无过滤，无应答函数
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                inbound: VecDeque::new(),
                written: Vec::new(),
                responder: None,
                bus_off: false,
                write_limit: None,
                fail_next_read: false,
                fail_next_write: false,
                bitrate: 1_000_000,
                filters: BTreeSet::new(),
                write_calls: 0,
            })),
        }
    }

    /// 注入一帧入站数据
    pub fn push_inbound(&self, frame: CanFrame) {
        self.state.lock().inbound.push_back(frame);
    }

    /// 尚未被读取的入站帧数量
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }

    /// 已被总线接受的出站帧（按发送顺序）
    pub fn written(&self) -> Vec<CanFrame> {
        self.state.lock().written.clone()
    }

    /// 取出并清空已发送记录
    pub fn take_written(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// `write` 被调用的次数（含失败）
    pub fn write_calls(&self) -> usize {
        self.state.lock().write_calls
    }

    /// 设置应答函数
    ///
    /// 应答函数在总线锁内执行，不能回调同一个 `MockBus`。
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&CanFrame) -> Vec<CanFrame> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    pub fn clear_responder(&self) {
        self.state.lock().responder = None;
    }

    /// 模拟 bus-off：写入全部失败，`bus_off()` 返回 true
    pub fn set_bus_off(&self, bus_off: bool) {
        debug!("Mock bus-off set to {}", bus_off);
        self.state.lock().bus_off = bus_off;
    }

    /// 下一次写入最多接受 `accepted` 帧（模拟发送缓冲满）
    pub fn limit_next_write(&self, accepted: usize) {
        self.state.lock().write_limit = Some(accepted);
    }

    /// 下一次读取返回错误
    pub fn fail_next_read(&self) {
        self.state.lock().fail_next_read = true;
    }

    /// 下一次写入返回错误
    pub fn fail_next_write(&self) {
        self.state.lock().fail_next_write = true;
    }

    /// 当前接收过滤集合（节点 ID）
    pub fn filters(&self) -> Vec<u8> {
        self.state.lock().filters.iter().copied().collect()
    }
}

impl CanBus for MockBus {
    fn read(&mut self, buf: &mut [CanFrame]) -> Result<usize, CanError> {
        let mut state = self.state.lock();
        if state.fail_next_read {
            state.fail_next_read = false;
            debug!("Mock read failure injected");
            return Err(CanError::Device("injected read failure".into()));
        }

        let mut count = 0;
        while count < buf.len() {
            let Some(frame) = state.inbound.pop_front() else {
                break;
            };
            if !state.filters.is_empty() && !state.filters.contains(&frame.node_id()) {
                trace!("Mock read dropped frame 0x{:03X} by filter", frame.id);
                continue;
            }
            buf[count] = frame;
            count += 1;
        }
        Ok(count)
    }

    fn write(&mut self, frames: &[CanFrame]) -> Result<usize, CanError> {
        let mut state = self.state.lock();
        state.write_calls += 1;
        if state.fail_next_write {
            state.fail_next_write = false;
            debug!("Mock write failure injected");
            return Err(CanError::Device("injected write failure".into()));
        }
        if state.bus_off {
            trace!("Mock write of {} frames rejected, bus-off", frames.len());
            return Err(CanError::BusOff);
        }

        let accepted = match state.write_limit.take() {
            Some(limit) => {
                let accepted = limit.min(frames.len());
                trace!("Mock write limited to {}/{} frames", accepted, frames.len());
                accepted
            },
            None => frames.len(),
        };

        let state = &mut *state;
        for frame in &frames[..accepted] {
            state.written.push(*frame);
            if let Some(responder) = state.responder.as_mut() {
                let replies = responder(frame);
                state.inbound.extend(replies);
            }
        }
        Ok(accepted)
    }

    fn bus_off(&mut self) -> Result<bool, CanError> {
        Ok(self.state.lock().bus_off)
    }

    fn bitrate(&mut self) -> Result<u32, CanError> {
        Ok(self.state.lock().bitrate)
    }

    fn set_bitrate(&mut self, bitrate: u32) -> Result<(), CanError> {
        if bitrate == 0 {
            return Err(CanError::Device(crate::CanDeviceError::new(
                crate::CanDeviceErrorKind::UnsupportedConfig,
                "bitrate must be positive",
            )));
        }
        self.state.lock().bitrate = bitrate;
        Ok(())
    }

    fn add_filter(&mut self, id: u8) -> Result<(), CanError> {
        self.state.lock().filters.insert(id);
        Ok(())
    }

    fn remove_filter(&mut self, id: u8) -> Result<(), CanError> {
        self.state.lock().filters.remove(&id);
        Ok(())
    }

    fn clear_filters(&mut self) -> Result<(), CanError> {
        self.state.lock().filters.clear();
        Ok(())
    }
}
