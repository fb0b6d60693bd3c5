//! 紧急报文（EMCY）与网络管理（NMT）

use crate::ids::{COB_NMT, COB_EMCY, COB_HEARTBEAT, cob_id};
use crate::{CanFrame, ProtocolError, read_u16_le};

// ============================================================================
// EMCY
// ============================================================================

/// 紧急报文（0x80 + 节点 ID）
///
/// ```text
/// Byte 0-1: 错误码（小端）
/// Byte 2:   错误寄存器（0x1001）
/// Byte 3-7: 厂商自定义
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyMessage {
    pub code: u16,
    pub register: u8,
    pub manufacturer: [u8; 5],
}

impl EmergencyMessage {
    /// 错误复位 / 无错误
    pub const NO_ERROR: u16 = 0x0000;
    /// 传感器故障
    pub const SENSOR: u16 = 0x7300;
    /// 通信故障
    pub const COMMUNICATION: u16 = 0x7500;
    /// 厂商定义：驱动器复位
    pub const DRIVE_RESET: u16 = 0xFF01;

    /// 错误码描述，未收录的返回 `None`
    pub fn description(&self) -> Option<&'static str> {
        match self.code {
            Self::NO_ERROR => Some("Error reset or no error"),
            0x1000 => Some("Generic error"),
            0x2310 => Some("Continuous over-current"),
            0x3210 => Some("DC-link over-voltage"),
            0x3220 => Some("DC-link under-voltage"),
            0x4280 => Some("Over temperature motor"),
            0x4310 => Some("Over temperature drive"),
            Self::SENSOR => Some("Sensor error (feedback)"),
            Self::COMMUNICATION => Some("Communication error"),
            0x8110 => Some("CAN overrun"),
            0x8130 => Some("Life guard error or heartbeat error"),
            0x8611 => Some("Following error"),
            Self::DRIVE_RESET => Some("Drive has been reset"),
            _ => None,
        }
    }

    /// 是否为错误复位报文
    pub fn is_reset(&self) -> bool {
        self.code == Self::NO_ERROR
    }
}

impl TryFrom<CanFrame> for EmergencyMessage {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        if frame.function_code() != COB_EMCY || frame.node_id() == 0 {
            return Err(ProtocolError::InvalidCanId {
                id: frame.id as u32,
            });
        }
        let data = frame.data_slice();
        if data.len() < 3 {
            return Err(ProtocolError::InvalidLength {
                expected: 3,
                actual: data.len(),
            });
        }

        let mut manufacturer = [0u8; 5];
        manufacturer.copy_from_slice(&frame.data[3..8]);
        Ok(Self {
            code: read_u16_le(data, 0)?,
            register: data[2],
            manufacturer,
        })
    }
}

// ============================================================================
// NMT
// ============================================================================

/// 心跳报文中的节点状态（0x700 + 节点 ID，Byte 0 低 7 位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive)]
#[repr(u8)]
pub enum NmtState {
    BootUp = 0x00,
    Stopped = 0x04,
    Operational = 0x05,
    PreOperational = 0x7F,
    #[default]
    Unknown = 0xFF,
}

impl NmtState {
    /// 解析心跳报文
    pub fn from_heartbeat(frame: &CanFrame) -> Result<Self, ProtocolError> {
        if frame.function_code() != COB_HEARTBEAT {
            return Err(ProtocolError::InvalidCanId {
                id: frame.id as u32,
            });
        }
        let byte = frame
            .data_slice()
            .first()
            .copied()
            .ok_or(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0,
            })?;
        // Bit 7 为 toggle（节点保护），不属于状态
        Ok(NmtState::from(byte & 0x7F))
    }
}

/// NMT 命令说明符
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum NmtCommand {
    Start = 0x01,
    Stop = 0x02,
    EnterPreOperational = 0x80,
    ResetNode = 0x81,
    ResetCommunication = 0x82,
}

impl NmtCommand {
    /// 构建 NMT 命令帧，`node_id` 为 0 时广播到所有节点
    pub fn frame(self, node_id: u8) -> CanFrame {
        CanFrame::new(cob_id(COB_NMT, 0), &[u8::from(self), node_id & 0x7F])
    }
}
