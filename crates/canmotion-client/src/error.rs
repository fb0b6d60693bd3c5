//! 节点层错误类型定义

use crate::control_mode::ControlMode;
use canmotion_protocol::{AbortCode, DriveState, DriveTransition, ProtocolError};
use thiserror::Error;

/// SDO 传输错误
///
/// 所有错误只影响当前调用，不做自动重试；传输槽位在返回前已释放。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdoError {
    /// 等待响应超时
    #[error("SDO timeout after {timeout_ms}ms (node 0x{node:02X})")]
    Timeout { node: u8, timeout_ms: u64 },

    /// 从站中止传输
    #[error("SDO transfer aborted by node 0x{node:02X}: {code}")]
    Abort { node: u8, code: AbortCode },

    /// 响应与请求不匹配（命令说明符或索引/子索引）
    #[error("SDO overrun (node 0x{node:02X}): {reason}")]
    Overrun { node: u8, reason: String },

    /// 分段传输 toggle 位未交替
    #[error("SDO toggle bit mismatch (node 0x{node:02X})")]
    ToggleMismatch { node: u8 },

    /// 数据长度与期望不符
    #[error("SDO size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// 目标缓冲区不足
    #[error("SDO buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// 出站缓冲拒绝（已满或尚未注册发送委托）
    #[error("Unable to send SDO request (node 0x{node:02X})")]
    SendFailed { node: u8 },

    /// 响应帧无法解析
    #[error("Malformed SDO response: {0}")]
    Protocol(#[from] ProtocolError),
}

/// CiA 402 状态机错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriveError {
    /// 控制字无法发送
    #[error("Unable to send controlword (node 0x{node:02X})")]
    SendFailed { node: u8 },

    /// 等待状态超时
    #[error("Timeout waiting for {expected} (node 0x{node:02X}, last seen {actual})")]
    Timeout {
        node: u8,
        expected: DriveState,
        actual: DriveState,
    },

    /// 当前状态下该转换无效
    #[error("Transition {transition:?} is not valid from {from}")]
    InvalidTransition {
        from: DriveState,
        transition: DriveTransition,
    },

    /// 目标状态不可达
    #[error("No transition path from {from} to {to}")]
    Unreachable { from: DriveState, to: DriveState },
}

/// 节点配置错误（构造期）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing mandatory key: {key}")]
    Missing { key: &'static str },

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// 节点操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("SDO error: {0}")]
    Sdo(#[from] SdoError),

    #[error("Drive error: {0}")]
    Drive(#[from] DriveError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to queue frame (node 0x{node:02X})")]
    SendFailed { node: u8 },

    /// 上报的控制模式在超时内未变为目标模式
    #[error("Control mode still {actual} instead of {expected} (node 0x{node:02X})")]
    ModeTimeout {
        node: u8,
        expected: ControlMode,
        actual: ControlMode,
    },

    /// 请求被节点逻辑拒绝（非法参数、模式不符、halt 位等）
    #[error("Request rejected: {0}")]
    Rejected(String),
}
