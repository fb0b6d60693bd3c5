//! # CANmotion Protocol
//!
//! CANopen 协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: COB-ID 常量与节点 ID 工具
//! - `sdo`: SDO 命令字、请求构建、响应分类、中止码表（CiA 301）
//! - `cia402`: 控制字/状态字位域、驱动状态机定义（CiA 402）
//! - `emcy`: 紧急报文与 NMT 心跳/命令
//! - `pdo`: TPDO 负载解析
//!
//! ## 字节序
//!
//! CANopen 使用 Intel 小端字节序（LSB 在前），与 Motorola 格式相反。

pub mod cia402;
pub mod emcy;
pub mod ids;
pub mod pdo;
pub mod sdo;

pub use cia402::*;
pub use emcy::*;
pub use ids::*;
pub use pdo::*;
pub use sdo::*;

use thiserror::Error;

/// 标准 CAN 帧最大数据长度
pub const MAX_DATA_LEN: usize = 8;

/// 11-bit 标准帧 ID 上限
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// CAN 2.0A 标准帧
///
/// 总线上所有边界交换的唯一帧类型：11-bit ID，0..=8 字节数据。
/// 构造后不可变（`Copy`，无生命周期）。
///
/// ```rust
/// use canmotion_protocol::CanFrame;
///
/// let frame = CanFrame::new(0x605, &[0x40, 0x81, 0x60, 0x00]);
/// assert_eq!(frame.node_id(), 5);
/// assert_eq!(frame.function_code(), 0x600);
/// assert_eq!(frame.data_slice(), &[0x40, 0x81, 0x60, 0x00]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanFrame {
    /// CAN ID（11-bit）
    pub id: u16,

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],
}

impl CanFrame {
    /// 创建标准帧，超过 8 字节的数据被截断，ID 被截断到 11 位
    pub fn new(id: u16, data: &[u8]) -> Self {
        let mut fixed = [0u8; MAX_DATA_LEN];
        let len = data.len().min(MAX_DATA_LEN);
        fixed[..len].copy_from_slice(&data[..len]);

        Self {
            id: id & MAX_STANDARD_ID,
            len: len as u8,
            data: fixed,
        }
    }

    /// 带校验的构造器
    ///
    /// # 错误
    ///
    /// - ID 超过 0x7FF 时返回 [`ProtocolError::InvalidCanId`]
    /// - 数据超过 8 字节时返回 [`ProtocolError::InvalidLength`]
    pub fn try_new(id: u16, data: &[u8]) -> Result<Self, ProtocolError> {
        if id > MAX_STANDARD_ID {
            return Err(ProtocolError::InvalidCanId { id: id as u32 });
        }
        if data.len() > MAX_DATA_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: MAX_DATA_LEN,
                actual: data.len(),
            });
        }
        Ok(Self::new(id, data))
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u16 {
        self.id
    }

    /// 节点 ID（低 7 位）
    pub fn node_id(&self) -> u8 {
        ids::node_of(self.id)
    }

    /// 功能码（高 4 位）
    pub fn function_code(&self) -> u16 {
        ids::function_of(self.id)
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u32 },
}

/// 从帧数据中按小端读取 u16，长度不足时返回错误
pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> Result<u16, ProtocolError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(ProtocolError::InvalidLength {
            expected: offset + 2,
            actual: data.len(),
        })
}

/// 从帧数据中按小端读取 u32，长度不足时返回错误
pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ProtocolError::InvalidLength {
            expected: offset + 4,
            actual: data.len(),
        })
}
