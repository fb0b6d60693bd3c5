//! CAN 适配层
//!
//! 定义总线句柄的最小契约：非阻塞批量读写、总线关闭查询、波特率与接收过滤。
//! 具体硬件后端（文件描述符、ioctl、DMA 缓冲区）不在本 crate 范围内，
//! 由外部实现 [`CanBus`] 接入。
//!
//! 启用 `mock` feature 后提供 [`MockBus`]，用于无硬件测试。

use thiserror::Error;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, Responder};

pub use canmotion_protocol::CanFrame;

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
    #[error("Device not started")]
    NotStarted,
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

impl CanError {
    /// 是否为致命错误（设备消失、权限不足），非致命错误下一个周期重试
    pub fn is_fatal(&self) -> bool {
        match self {
            CanError::Device(e) => e.is_fatal(),
            CanError::NotStarted => true,
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NoDevice
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 总线句柄
///
/// 读写均为非阻塞：没有数据时 `read` 返回 `Ok(0)`，总线缓冲满时 `write`
/// 返回已接受的帧数（可能小于请求数）。
///
/// # 线程模型
///
/// 句柄由读线程与写线程共享（外部互斥），实现无需自带同步，
/// 但必须是 `Send`。
pub trait CanBus: Send {
    /// 读取最多 `buf.len()` 帧，返回实际读取数量
    fn read(&mut self, buf: &mut [CanFrame]) -> Result<usize, CanError>;

    /// 批量写入，返回被总线接受的帧数（前缀）
    fn write(&mut self, frames: &[CanFrame]) -> Result<usize, CanError>;

    /// 总线是否处于 bus-off 状态
    fn bus_off(&mut self) -> Result<bool, CanError>;

    /// 当前波特率（bit/s）
    fn bitrate(&mut self) -> Result<u32, CanError>;

    /// 设置波特率（bit/s）
    fn set_bitrate(&mut self, bitrate: u32) -> Result<(), CanError>;

    /// 添加接收过滤（节点 ID），默认接受所有帧
    fn add_filter(&mut self, id: u8) -> Result<(), CanError> {
        let _ = id;
        Ok(())
    }

    /// 移除接收过滤
    fn remove_filter(&mut self, id: u8) -> Result<(), CanError> {
        let _ = id;
        Ok(())
    }

    /// 清空所有接收过滤
    fn clear_filters(&mut self) -> Result<(), CanError> {
        Ok(())
    }
}

impl<T: CanBus + ?Sized> CanBus for Box<T> {
    fn read(&mut self, buf: &mut [CanFrame]) -> Result<usize, CanError> {
        (**self).read(buf)
    }

    fn write(&mut self, frames: &[CanFrame]) -> Result<usize, CanError> {
        (**self).write(frames)
    }

    fn bus_off(&mut self) -> Result<bool, CanError> {
        (**self).bus_off()
    }

    fn bitrate(&mut self) -> Result<u32, CanError> {
        (**self).bitrate()
    }

    fn set_bitrate(&mut self, bitrate: u32) -> Result<(), CanError> {
        (**self).set_bitrate(bitrate)
    }

    fn add_filter(&mut self, id: u8) -> Result<(), CanError> {
        (**self).add_filter(id)
    }

    fn remove_filter(&mut self, id: u8) -> Result<(), CanError> {
        (**self).remove_filter(id)
    }

    fn clear_filters(&mut self) -> Result<(), CanError> {
        (**self).clear_filters()
    }
}
