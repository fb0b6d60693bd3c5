//! PDO 负载（默认映射）
//!
//! | 通道 | 方向 | 内容 |
//! |---|---|---|
//! | TPDO1 | 从站 → 主站 | 状态字 u16, 厂商状态寄存器 u16, 运行模式 i8 |
//! | TPDO2 | 从站 → 主站 | 运动错误寄存器 u16, 详细错误寄存器 u16 |
//! | TPDO3 | 从站 → 主站 | 实际位置 i32, 实际电流 i16 |
//! | RPDO1 | 主站 → 从站 | 控制字 u16 |

use crate::ids::{COB_RPDO1, COB_TPDO1, COB_TPDO2, COB_TPDO3, cob_id};
use crate::{CanFrame, ProtocolError, read_u16_le, read_u32_le};
use crate::cia402::ModesOfOperation;

fn check_function(frame: &CanFrame, function: u16) -> Result<(), ProtocolError> {
    if frame.function_code() != function {
        return Err(ProtocolError::InvalidCanId {
            id: frame.id as u32,
        });
    }
    Ok(())
}

fn check_length(frame: &CanFrame, expected: usize) -> Result<(), ProtocolError> {
    if (frame.len as usize) < expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: frame.len as usize,
        });
    }
    Ok(())
}

/// TPDO1：状态信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPdo {
    pub statusword: u16,
    pub manufacturer_status: u16,
    pub modes_of_operation: ModesOfOperation,
}

impl TryFrom<CanFrame> for StatusPdo {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        check_function(&frame, COB_TPDO1)?;
        check_length(&frame, 5)?;
        let data = frame.data_slice();
        Ok(Self {
            statusword: read_u16_le(data, 0)?,
            manufacturer_status: read_u16_le(data, 2)?,
            modes_of_operation: ModesOfOperation::from(data[4] as i8),
        })
    }
}

/// TPDO2：错误寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorPdo {
    pub motion_error: u16,
    pub detailed_error: u16,
}

impl TryFrom<CanFrame> for ErrorPdo {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        check_function(&frame, COB_TPDO2)?;
        check_length(&frame, 4)?;
        let data = frame.data_slice();
        Ok(Self {
            motion_error: read_u16_le(data, 0)?,
            detailed_error: read_u16_le(data, 2)?,
        })
    }
}

/// TPDO3：位置与电流（驱动器内部单位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionPdo {
    pub position: i32,
    pub current: i16,
}

impl TryFrom<CanFrame> for MotionPdo {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        check_function(&frame, COB_TPDO3)?;
        check_length(&frame, 6)?;
        let data = frame.data_slice();
        Ok(Self {
            position: read_u32_le(data, 0)? as i32,
            current: read_u16_le(data, 4)? as i16,
        })
    }
}

/// RPDO1：控制字帧
pub fn controlword_frame(node_id: u8, controlword: u16) -> CanFrame {
    CanFrame::new(cob_id(COB_RPDO1, node_id), &controlword.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_pdo() {
        let frame = CanFrame::new(0x18F, &[0x37, 0x06, 0x00, 0x80, 0x01]);
        let pdo = StatusPdo::try_from(frame).unwrap();
        assert_eq!(pdo.statusword, 0x0637);
        assert_eq!(pdo.manufacturer_status, 0x8000);
        assert_eq!(pdo.modes_of_operation, ModesOfOperation::ProfilePosition);
    }

    #[test]
    fn test_status_pdo_negative_mode() {
        let frame = CanFrame::new(0x18F, &[0x37, 0x02, 0x00, 0x00, 0xFB]);
        let pdo = StatusPdo::try_from(frame).unwrap();
        assert_eq!(pdo.modes_of_operation, ModesOfOperation::ManufacturerCurrent);
    }

    #[test]
    fn test_status_pdo_too_short() {
        let frame = CanFrame::new(0x18F, &[0x37, 0x02]);
        assert!(matches!(
            StatusPdo::try_from(frame),
            Err(ProtocolError::InvalidLength {
                expected: 5,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_error_pdo() {
        let frame = CanFrame::new(0x28F, &[0x01, 0x00, 0x00, 0x40]);
        let pdo = ErrorPdo::try_from(frame).unwrap();
        assert_eq!(pdo.motion_error, 0x0001);
        assert_eq!(pdo.detailed_error, 0x4000);
    }

    #[test]
    fn test_motion_pdo() {
        let frame = CanFrame::new(0x38F, &[0x18, 0xFC, 0xFF, 0xFF, 0x9C, 0xFF]);
        let pdo = MotionPdo::try_from(frame).unwrap();
        assert_eq!(pdo.position, -1000);
        assert_eq!(pdo.current, -100);
    }

    #[test]
    fn test_wrong_channel_rejected() {
        let frame = CanFrame::new(0x28F, &[0; 8]);
        assert!(MotionPdo::try_from(frame).is_err());
        assert!(StatusPdo::try_from(frame).is_err());
    }

    #[test]
    fn test_controlword_frame() {
        let frame = controlword_frame(0x0F, 0x000F);
        assert_eq!(frame.id, 0x20F);
        assert_eq!(frame.data_slice(), &[0x0F, 0x00]);
    }
}
