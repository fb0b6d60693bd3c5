//! 驱动层错误类型定义

use canmotion_can::CanError;
use canmotion_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议错误（如非法帧 ID）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置无效
    #[error("Invalid bus configuration: {0}")]
    InvalidConfig(String),

    /// 节点 ID 重复注册
    #[error("Node 0x{id:02X} is already registered")]
    DuplicateNode { id: u8 },

    /// 调度线程已在运行
    #[error("Dispatch threads already running")]
    AlreadyRunning,

    /// 调度线程未运行
    #[error("Dispatch threads not running")]
    NotRunning,

    /// 出站缓冲区已满
    #[error("Outbound buffer full (capacity: {capacity})")]
    BufferFull { capacity: usize },

    /// 线程创建失败
    #[error("Failed to spawn {0} thread")]
    ThreadSpawn(String),

    /// 线程未能在超时内退出
    #[error("{0} thread did not shut down in time")]
    JoinTimeout(&'static str),
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use canmotion_can::CanError;
    use canmotion_protocol::ProtocolError;

    /// 测试 DriverError 的 Display 实现
    #[test]
    fn test_driver_error_display() {
        let driver_error = DriverError::Can(CanError::BusOff);
        assert_eq!(format!("{}", driver_error), "CAN driver error: Bus off");

        let driver_error = DriverError::Protocol(ProtocolError::InvalidCanId { id: 0x800 });
        assert!(format!("{}", driver_error).contains("Invalid CAN ID: 0x800"));

        let driver_error = DriverError::DuplicateNode { id: 0x0F };
        assert_eq!(format!("{}", driver_error), "Node 0x0F is already registered");

        let driver_error = DriverError::BufferFull { capacity: 16 };
        assert!(format!("{}", driver_error).contains("capacity: 16"));

        let driver_error = DriverError::JoinTimeout("RX");
        assert_eq!(
            format!("{}", driver_error),
            "RX thread did not shut down in time"
        );
    }

    /// 测试 From<CanError> 转换
    #[test]
    fn test_from_can_error() {
        let driver_error: DriverError = CanError::Timeout.into();
        assert!(matches!(driver_error, DriverError::Can(CanError::Timeout)));
    }

    /// 测试 From<ProtocolError> 转换
    #[test]
    fn test_from_protocol_error() {
        let protocol_error = ProtocolError::InvalidCanId { id: 0x123 };
        let driver_error: DriverError = protocol_error.into();
        match driver_error {
            DriverError::Protocol(ProtocolError::InvalidCanId { id }) => assert_eq!(id, 0x123),
            _ => panic!("Expected Protocol variant"),
        }
    }
}
