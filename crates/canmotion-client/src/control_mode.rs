//! 轴控制模式

use std::fmt;

/// 轴对外呈现的控制模式
///
/// 由驱动状态与运行模式（0x6061）共同推导。`ForceIdle` 只用于请求，不会被上报。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlMode {
    Idle,
    Position,
    Velocity,
    Torque,
    Current,
    PositionDirect,
    /// 驱动器处于故障或故障响应中
    HwFault,
    /// 节点尚未完成初始化
    #[default]
    NotConfigured,
    Unknown,
    /// 请求：先复位故障，再进入 Idle
    ForceIdle,
}

impl ControlMode {
    /// 力矩与电流共用同一个驱动器模式，互相切换无需重新配置
    pub fn same_drive_mode(self, other: ControlMode) -> bool {
        self == other
            || matches!(
                (self, other),
                (ControlMode::Torque, ControlMode::Current) | (ControlMode::Current, ControlMode::Torque)
            )
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlMode::Idle => "idle",
            ControlMode::Position => "position",
            ControlMode::Velocity => "velocity",
            ControlMode::Torque => "torque",
            ControlMode::Current => "current",
            ControlMode::PositionDirect => "position direct",
            ControlMode::HwFault => "hardware fault",
            ControlMode::NotConfigured => "not configured",
            ControlMode::Unknown => "unknown",
            ControlMode::ForceIdle => "force idle",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torque_current_equivalence() {
        assert!(ControlMode::Torque.same_drive_mode(ControlMode::Current));
        assert!(ControlMode::Position.same_drive_mode(ControlMode::Position));
        assert!(!ControlMode::Position.same_drive_mode(ControlMode::Velocity));
    }

    #[test]
    fn test_display() {
        assert_eq!(ControlMode::HwFault.to_string(), "hardware fault");
        assert_eq!(ControlMode::default(), ControlMode::NotConfigured);
    }
}
