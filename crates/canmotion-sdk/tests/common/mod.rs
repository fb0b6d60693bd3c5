//! 集成测试基础设施
//!
//! `ServoBank` 在 `MockBus` 的应答函数中模拟一组 CiA 402 伺服：
//! 控制字（RPDO1）按状态图推进并回 TPDO1，SDO 快速读写落到各自的对象字典。

#![allow(dead_code)]

use canmotion_can::MockBus;
use canmotion_sdk::client::NodeConfig;
use canmotion_sdk::driver::{BusBuilder, CanBusBroker};
use canmotion_sdk::protocol::{
    CanFrame, DriveState, DriveTransition, INDEX_MODES_OF_OPERATION, INDEX_STATUSWORD, cob_id,
    next_state,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub fn statusword_for(state: DriveState) -> u16 {
    match state {
        DriveState::NotReadyToSwitchOn => 0x0000,
        DriveState::SwitchOnDisabled => 0x0250,
        DriveState::ReadyToSwitchOn => 0x0231,
        DriveState::SwitchedOn => 0x0233,
        DriveState::OperationEnabled => 0x0237,
        DriveState::QuickStopActive => 0x0217,
        DriveState::FaultReactionActive => 0x021F,
        DriveState::Fault => 0x0218,
    }
}

pub fn node_config(can_id: u8) -> NodeConfig {
    NodeConfig {
        can_id,
        tr: 160.0,
        min: -180.0,
        max: 180.0,
        max_vel: 30.0,
        ref_speed: 10.0,
        ref_acceleration: 5.0,
        encoder_pulses: 4096,
        sdo_timeout: Duration::from_millis(250),
        drive_state_timeout: Duration::from_secs(1),
    }
}

/// 1 ms 轮询周期的调度引擎
pub fn broker(bus: &MockBus) -> CanBusBroker {
    BusBuilder::new()
        .rx_delay(Duration::from_millis(1))
        .tx_delay(Duration::from_millis(1))
        .build(bus.clone())
        .unwrap()
}

pub struct SimServo {
    pub state: DriveState,
    pub dictionary: HashMap<(u16, u8), Vec<u8>>,
    pub controlwords: Vec<u16>,
    pub nmt: Vec<u8>,
    /// 对这些对象的写入回复中止帧
    pub read_only: Vec<u16>,
}

impl Default for SimServo {
    fn default() -> Self {
        Self {
            state: DriveState::SwitchOnDisabled,
            dictionary: HashMap::new(),
            controlwords: Vec::new(),
            nmt: Vec::new(),
            read_only: Vec::new(),
        }
    }
}

impl SimServo {
    fn mode(&self) -> u8 {
        self.dictionary
            .get(&(INDEX_MODES_OF_OPERATION, 0))
            .map(|v| v[0])
            .unwrap_or(0)
    }

    fn status_frame(&self, id: u8) -> CanFrame {
        let sw = statusword_for(self.state).to_le_bytes();
        CanFrame::new(cob_id(0x180, id), &[sw[0], sw[1], 0, 0, self.mode()])
    }

    fn on_controlword(&mut self, cw: u16) {
        self.controlwords.push(cw);
        let candidates = [
            DriveTransition::FaultReset,
            DriveTransition::Shutdown,
            DriveTransition::SwitchOn,
            DriveTransition::EnableOperation,
            DriveTransition::QuickStop,
            DriveTransition::DisableVoltage,
        ];
        if let Some(next) = candidates
            .iter()
            .filter(|t| t.apply(cw) == cw)
            .find_map(|t| next_state(self.state, *t))
        {
            self.state = next;
        }
    }

    fn on_sdo(&mut self, id: u8, data: &[u8], out: &mut Vec<CanFrame>) {
        let index = u16::from_le_bytes([data[1], data[2]]);
        let sub = data[3];
        let mut reply = [0u8; 8];
        reply[1..4].copy_from_slice(&data[1..4]);
        let abort = |reply: &mut [u8; 8], code: u32| {
            reply[0] = 0x80;
            reply[4..8].copy_from_slice(&code.to_le_bytes());
        };

        match data[0] {
            0x40 => {
                let value = if index == INDEX_STATUSWORD {
                    Some(statusword_for(self.state).to_le_bytes().to_vec())
                } else {
                    self.dictionary.get(&(index, sub)).cloned()
                };
                match value {
                    Some(value) => {
                        reply[0] = 0x43 | (((4 - value.len()) as u8) << 2);
                        reply[4..4 + value.len()].copy_from_slice(&value);
                    },
                    None => abort(&mut reply, 0x0602_0000),
                }
                out.push(CanFrame::new(cob_id(0x580, id), &reply));
            },
            cmd if cmd & 0xE3 == 0x23 => {
                if self.read_only.contains(&index) {
                    abort(&mut reply, 0x0601_0002);
                    out.push(CanFrame::new(cob_id(0x580, id), &reply));
                    return;
                }
                let len = 4 - ((cmd >> 2) & 0x03) as usize;
                self.dictionary.insert((index, sub), data[4..4 + len].to_vec());
                reply[0] = 0x60;
                out.push(CanFrame::new(cob_id(0x580, id), &reply));
                if index == INDEX_MODES_OF_OPERATION {
                    out.push(self.status_frame(id));
                }
            },
            _ => {},
        }
    }
}

/// 一组模拟伺服，可在测试中共享检查
#[derive(Clone, Default)]
pub struct ServoBank {
    servos: Arc<Mutex<HashMap<u8, SimServo>>>,
}

impl ServoBank {
    pub fn new(ids: &[u8]) -> Self {
        let bank = Self::default();
        for &id in ids {
            bank.servos.lock().insert(id, SimServo::default());
        }
        bank
    }

    /// 挂到总线上作为应答函数
    pub fn install(&self, bus: &MockBus) {
        let bank = self.clone();
        bus.set_responder(move |frame: &CanFrame| bank.respond(frame));
    }

    pub fn respond(&self, frame: &CanFrame) -> Vec<CanFrame> {
        let mut out = Vec::new();
        let mut servos = self.servos.lock();
        let data = frame.data_slice();

        match frame.function_code() {
            0x000 => {
                let target = data[1];
                for (id, servo) in servos.iter_mut() {
                    if target == 0 || target == *id {
                        servo.nmt.push(data[0]);
                    }
                }
            },
            0x200 => {
                if let Some(servo) = servos.get_mut(&frame.node_id()) {
                    servo.on_controlword(u16::from_le_bytes([data[0], data[1]]));
                    out.push(servo.status_frame(frame.node_id()));
                }
            },
            0x600 => {
                if let Some(servo) = servos.get_mut(&frame.node_id()) {
                    servo.on_sdo(frame.node_id(), data, &mut out);
                }
            },
            _ => {},
        }
        out
    }

    pub fn with<R>(&self, id: u8, f: impl FnOnce(&mut SimServo) -> R) -> R {
        let mut servos = self.servos.lock();
        let servo = servos.entry(id).or_default();
        f(servo)
    }

    pub fn controlwords(&self, id: u8) -> Vec<u16> {
        self.with(id, |s| s.controlwords.clone())
    }

    pub fn stored(&self, id: u8, index: u16) -> Option<Vec<u8>> {
        self.with(id, |s| s.dictionary.get(&(index, 0)).cloned())
    }

    pub fn nmt(&self, id: u8) -> Vec<u8> {
        self.with(id, |s| s.nmt.clone())
    }

    /// 强制进入某状态，返回应注入总线的 TPDO1
    pub fn force_state(&self, id: u8, state: DriveState) -> CanFrame {
        self.with(id, |s| {
            s.state = state;
            s.status_frame(id)
        })
    }
}

/// 轮询等待条件成立（最多约 1 秒）
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
