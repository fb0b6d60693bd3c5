//! CiA 402 驱动器配置文件
//!
//! 控制字（0x6040）、状态字（0x6041）位域定义，驱动状态解析，
//! 以及标准状态图上的转换表。

use bilge::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// 控制字对象索引
pub const INDEX_CONTROLWORD: u16 = 0x6040;
/// 状态字对象索引
pub const INDEX_STATUSWORD: u16 = 0x6041;
/// 运行模式（写）
pub const INDEX_MODES_OF_OPERATION: u16 = 0x6060;
/// 运行模式（读回）
pub const INDEX_MODES_OF_OPERATION_DISPLAY: u16 = 0x6061;
/// 目标位置
pub const INDEX_TARGET_POSITION: u16 = 0x607A;
/// 轮廓速度
pub const INDEX_PROFILE_VELOCITY: u16 = 0x6081;
/// 轮廓加速度
pub const INDEX_PROFILE_ACCELERATION: u16 = 0x6083;
/// 目标速度
pub const INDEX_TARGET_VELOCITY: u16 = 0x60FF;
/// 插补数据记录，子索引 1 为位置给定
pub const INDEX_INTERPOLATION_DATA: u16 = 0x60C1;

// ============================================================================
// 位域
// ============================================================================

/// 状态字位域（0x6041）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct StatusWord {
    pub ready_to_switch_on: bool,  // Bit 0
    pub switched_on: bool,         // Bit 1
    pub operation_enabled: bool,   // Bit 2
    pub fault: bool,               // Bit 3
    pub voltage_enabled: bool,     // Bit 4
    pub quick_stop: bool,          // Bit 5: 0 = 快速停止激活
    pub switch_on_disabled: bool,  // Bit 6
    pub warning: bool,             // Bit 7
    pub manufacturer_8: bool,      // Bit 8
    pub remote: bool,              // Bit 9
    pub target_reached: bool,      // Bit 10
    pub internal_limit: bool,      // Bit 11
    pub mode_specific: u2,         // Bit 12-13
    pub manufacturer_14: u2,       // Bit 14-15
}

/// 控制字位域（0x6040）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct ControlWord {
    pub switch_on: bool,              // Bit 0
    pub enable_voltage: bool,         // Bit 1
    pub quick_stop: bool,             // Bit 2: 0 = 请求快速停止
    pub enable_operation: bool,       // Bit 3
    pub new_setpoint: bool,           // Bit 4（模式相关）
    pub change_immediately: bool,     // Bit 5（模式相关）
    pub relative: bool,               // Bit 6（模式相关）
    pub fault_reset: bool,            // Bit 7
    pub halt: bool,                   // Bit 8
    pub change_on_setpoint: bool,     // Bit 9
    pub bit10: bool,                  // Bit 10
    pub manufacturer: u5,             // Bit 11-15
}

impl StatusWord {
    pub fn from_raw(raw: u16) -> Self {
        StatusWord::from(u16::new(raw))
    }
}

impl ControlWord {
    pub fn from_raw(raw: u16) -> Self {
        ControlWord::from(u16::new(raw))
    }

    pub fn raw(self) -> u16 {
        u16::from(self).value()
    }
}

// ============================================================================
// 驱动状态
// ============================================================================

/// CiA 402 驱动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DriveState {
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActive,
    Fault,
}

impl DriveState {
    /// 所有状态（按状态图顺序）
    pub const ALL: [DriveState; 8] = [
        DriveState::NotReadyToSwitchOn,
        DriveState::SwitchOnDisabled,
        DriveState::ReadyToSwitchOn,
        DriveState::SwitchedOn,
        DriveState::OperationEnabled,
        DriveState::QuickStopActive,
        DriveState::FaultReactionActive,
        DriveState::Fault,
    ];

    /// 是否处于故障相关状态
    pub fn is_fault(self) -> bool {
        matches!(self, DriveState::Fault | DriveState::FaultReactionActive)
    }
}

impl fmt::Display for DriveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriveState::NotReadyToSwitchOn => "not ready to switch on",
            DriveState::SwitchOnDisabled => "switch on disabled",
            DriveState::ReadyToSwitchOn => "ready to switch on",
            DriveState::SwitchedOn => "switched on",
            DriveState::OperationEnabled => "operation enabled",
            DriveState::QuickStopActive => "quick stop active",
            DriveState::FaultReactionActive => "fault reaction active",
            DriveState::Fault => "fault",
        };
        f.write_str(name)
    }
}

/// 状态字参与判定的位：{0, 1, 2, 3, 5, 6}
pub const STATUSWORD_STATE_MASK: u16 = 0x006F;

/// 状态解析表：(掩码, 期望值, 状态)，按顺序匹配，首个命中生效
///
/// 掩码 0x4F 表示 Bit 5 不参与（x），0x6F 表示 Bit 5 参与。
const STATUSWORD_TABLE: [(u16, u16, DriveState); 8] = [
    (0x4F, 0x00, DriveState::NotReadyToSwitchOn),
    (0x4F, 0x40, DriveState::SwitchOnDisabled),
    (0x6F, 0x21, DriveState::ReadyToSwitchOn),
    (0x6F, 0x23, DriveState::SwitchedOn),
    (0x6F, 0x27, DriveState::OperationEnabled),
    (0x6F, 0x07, DriveState::QuickStopActive),
    (0x4F, 0x0F, DriveState::FaultReactionActive),
    (0x4F, 0x08, DriveState::Fault),
];

/// 由状态字推导驱动状态
///
/// 纯函数，对所有 16 位输入有定义。不在表中的位组合（驱动器过渡中的瞬态）
/// 归为 [`DriveState::NotReadyToSwitchOn`]。
///
/// ```rust
/// use canmotion_protocol::{DriveState, parse_statusword};
///
/// assert_eq!(parse_statusword(0x0250), DriveState::SwitchOnDisabled);
/// assert_eq!(parse_statusword(0x0237), DriveState::OperationEnabled);
/// assert_eq!(parse_statusword(0x0218), DriveState::Fault);
/// ```
pub fn parse_statusword(statusword: u16) -> DriveState {
    let bits = statusword & STATUSWORD_STATE_MASK;
    STATUSWORD_TABLE
        .iter()
        .find(|(mask, value, _)| bits & mask == *value)
        .map(|(_, _, state)| *state)
        .unwrap_or(DriveState::NotReadyToSwitchOn)
}

// ============================================================================
// 状态转换
// ============================================================================

/// 控制字命令（写入 Bit 0-3 与 Bit 7）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveTransition {
    Shutdown,
    SwitchOn,
    DisableVoltage,
    QuickStop,
    EnableOperation,
    FaultReset,
    /// 与 `SwitchOn` 使用相同的控制字模式
    DisableOperation,
}

impl DriveTransition {
    /// 路径搜索使用的候选命令（不含 FaultReset：故障需显式复位）
    const PATH_CANDIDATES: [DriveTransition; 5] = [
        DriveTransition::Shutdown,
        DriveTransition::SwitchOn,
        DriveTransition::EnableOperation,
        DriveTransition::DisableVoltage,
        DriveTransition::QuickStop,
    ];

    /// 该命令的参考控制字（其余位为 0）
    pub fn pattern(self) -> u16 {
        match self {
            DriveTransition::Shutdown => 0x0006,
            DriveTransition::SwitchOn | DriveTransition::DisableOperation => 0x0007,
            DriveTransition::DisableVoltage => 0x0000,
            DriveTransition::QuickStop => 0x0002,
            DriveTransition::EnableOperation => 0x000F,
            DriveTransition::FaultReset => 0x0080,
        }
    }

    /// 在现有控制字上写入命令位，保留模式相关位（≥4，除 Bit 7）与应用位（≥8）
    pub fn apply(self, controlword: u16) -> u16 {
        let mut cw = ControlWord::from_raw(controlword);
        match self {
            DriveTransition::Shutdown => {
                cw.set_fault_reset(false);
                cw.set_switch_on(false);
                cw.set_enable_voltage(true);
                cw.set_quick_stop(true);
            },
            DriveTransition::SwitchOn | DriveTransition::DisableOperation => {
                cw.set_fault_reset(false);
                cw.set_enable_operation(false);
                cw.set_switch_on(true);
                cw.set_enable_voltage(true);
                cw.set_quick_stop(true);
            },
            DriveTransition::DisableVoltage => {
                cw.set_fault_reset(false);
                cw.set_enable_voltage(false);
            },
            DriveTransition::QuickStop => {
                cw.set_fault_reset(false);
                cw.set_quick_stop(false);
                cw.set_enable_voltage(true);
            },
            DriveTransition::EnableOperation => {
                cw.set_fault_reset(false);
                cw.set_switch_on(true);
                cw.set_enable_voltage(true);
                cw.set_quick_stop(true);
                cw.set_enable_operation(true);
            },
            DriveTransition::FaultReset => {
                cw.set_fault_reset(true);
            },
        }
        cw.raw()
    }
}

/// 标准 CiA 402 状态图：当前状态 + 命令 → 目标状态
///
/// 返回 `None` 表示该命令在当前状态下无效。
pub fn next_state(state: DriveState, transition: DriveTransition) -> Option<DriveState> {
    use DriveState::*;
    use DriveTransition::*;

    match (state, transition) {
        (SwitchOnDisabled, Shutdown) => Some(ReadyToSwitchOn),
        (ReadyToSwitchOn, SwitchOn | DisableOperation) => Some(SwitchedOn),
        (SwitchedOn, EnableOperation) => Some(OperationEnabled),
        (OperationEnabled, SwitchOn | DisableOperation) => Some(SwitchedOn),
        (SwitchedOn | OperationEnabled, Shutdown) => Some(ReadyToSwitchOn),
        (ReadyToSwitchOn | SwitchedOn | OperationEnabled, DisableVoltage) => Some(SwitchOnDisabled),
        (ReadyToSwitchOn | SwitchedOn, QuickStop) => Some(SwitchOnDisabled),
        (OperationEnabled, QuickStop) => Some(QuickStopActive),
        (QuickStopActive, DisableVoltage) => Some(SwitchOnDisabled),
        (QuickStopActive, EnableOperation) => Some(OperationEnabled),
        (Fault, FaultReset) => Some(SwitchOnDisabled),
        _ => None,
    }
}

/// 求从 `from` 到 `to` 的最短命令序列（广度优先）
///
/// 不经过 `FaultReset`；`from == to` 时返回空序列；不可达时返回 `None`。
pub fn shortest_path(from: DriveState, to: DriveState) -> Option<Vec<DriveTransition>> {
    if from == to {
        return Some(Vec::new());
    }

    let mut parent: HashMap<DriveState, (DriveState, DriveTransition)> = HashMap::new();
    let mut queue = VecDeque::from([from]);

    while let Some(state) = queue.pop_front() {
        for transition in DriveTransition::PATH_CANDIDATES {
            let Some(next) = next_state(state, transition) else {
                continue;
            };
            if next == from || parent.contains_key(&next) {
                continue;
            }
            parent.insert(next, (state, transition));

            if next == to {
                let mut path = Vec::new();
                let mut cursor = to;
                while let Some(&(prev, step)) = parent.get(&cursor) {
                    path.push(step);
                    if prev == from {
                        break;
                    }
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }

    None
}

// ============================================================================
// 运行模式（0x6060 / 0x6061）
// ============================================================================

/// 运行模式
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(i8)]
pub enum ModesOfOperation {
    /// 厂商自定义电流模式
    ManufacturerCurrent = -5,
    /// 无模式
    NoMode = 0,
    ProfilePosition = 1,
    ProfileVelocity = 3,
    ProfileTorque = 4,
    Homing = 6,
    InterpolatedPosition = 7,
    CyclicSyncPosition = 8,
    CyclicSyncVelocity = 9,
    CyclicSyncTorque = 10,
    /// 未收录的模式值
    #[default]
    Unknown = -128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_statusword_table() {
        assert_eq!(parse_statusword(0x0000), DriveState::NotReadyToSwitchOn);
        assert_eq!(parse_statusword(0x0040), DriveState::SwitchOnDisabled);
        assert_eq!(parse_statusword(0x0060), DriveState::SwitchOnDisabled);
        assert_eq!(parse_statusword(0x0021), DriveState::ReadyToSwitchOn);
        assert_eq!(parse_statusword(0x0023), DriveState::SwitchedOn);
        assert_eq!(parse_statusword(0x0027), DriveState::OperationEnabled);
        assert_eq!(parse_statusword(0x0007), DriveState::QuickStopActive);
        assert_eq!(parse_statusword(0x000F), DriveState::FaultReactionActive);
        assert_eq!(parse_statusword(0x002F), DriveState::FaultReactionActive);
        assert_eq!(parse_statusword(0x0008), DriveState::Fault);
        assert_eq!(parse_statusword(0x0028), DriveState::Fault);
    }

    #[test]
    fn test_parse_statusword_ignores_other_bits() {
        // Bit 4（电压）、Bit 7（警告）、Bit 9（远程）、Bit 10（到位）不影响状态
        assert_eq!(parse_statusword(0x0637), DriveState::OperationEnabled);
        assert_eq!(parse_statusword(0x82B3), DriveState::SwitchedOn);
        assert_eq!(parse_statusword(0xFF90 | 0x40), DriveState::SwitchOnDisabled);
    }

    #[test]
    fn test_parse_statusword_fallback() {
        // Bit 6 置位但低位非 0000：驱动器瞬态
        assert_eq!(parse_statusword(0x0041), DriveState::NotReadyToSwitchOn);
        assert_eq!(parse_statusword(0x0004), DriveState::NotReadyToSwitchOn);
    }

    proptest! {
        #[test]
        fn prop_parse_statusword_total_and_deterministic(raw in any::<u16>()) {
            let a = parse_statusword(raw);
            let b = parse_statusword(raw);
            prop_assert_eq!(a, b);
            prop_assert!(DriveState::ALL.contains(&a));
            // 只依赖掩码内的位
            prop_assert_eq!(a, parse_statusword(raw & STATUSWORD_STATE_MASK));
        }

        #[test]
        fn prop_transition_preserves_upper_bits(raw in any::<u16>()) {
            let transitions = [
                DriveTransition::Shutdown,
                DriveTransition::SwitchOn,
                DriveTransition::DisableVoltage,
                DriveTransition::QuickStop,
                DriveTransition::EnableOperation,
                DriveTransition::DisableOperation,
            ];
            for t in transitions {
                let out = t.apply(raw);
                // Bit 4-6 与 Bit 8-15 保持不变，Bit 7 清零
                prop_assert_eq!(out & 0xFF70, raw & 0xFF70);
                prop_assert_eq!(out & 0x0080, 0);
            }
            prop_assert_eq!(DriveTransition::FaultReset.apply(raw), raw | 0x0080);
        }
    }

    #[test]
    fn test_transition_patterns_from_zero() {
        for t in [
            DriveTransition::Shutdown,
            DriveTransition::SwitchOn,
            DriveTransition::QuickStop,
            DriveTransition::EnableOperation,
            DriveTransition::FaultReset,
            DriveTransition::DisableOperation,
        ] {
            assert_eq!(t.apply(0), t.pattern(), "{:?}", t);
        }
    }

    #[test]
    fn test_transition_from_enabled_word() {
        // 从 0x011F（使能 + 新设定点 + 暂停）切换
        assert_eq!(DriveTransition::Shutdown.apply(0x011F), 0x011E);
        assert_eq!(DriveTransition::SwitchOn.apply(0x011F), 0x0117);
        assert_eq!(DriveTransition::DisableVoltage.apply(0x011F), 0x011D);
        assert_eq!(DriveTransition::QuickStop.apply(0x011F), 0x011B);
        assert_eq!(DriveTransition::EnableOperation.apply(0x0186), 0x010F);
    }

    #[test]
    fn test_next_state_graph() {
        use DriveState::*;
        use DriveTransition::*;

        assert_eq!(next_state(SwitchOnDisabled, Shutdown), Some(ReadyToSwitchOn));
        assert_eq!(next_state(ReadyToSwitchOn, SwitchOn), Some(SwitchedOn));
        assert_eq!(next_state(SwitchedOn, EnableOperation), Some(OperationEnabled));
        assert_eq!(next_state(OperationEnabled, DisableOperation), Some(SwitchedOn));
        assert_eq!(next_state(OperationEnabled, QuickStop), Some(QuickStopActive));
        assert_eq!(next_state(Fault, FaultReset), Some(SwitchOnDisabled));
        assert_eq!(next_state(SwitchOnDisabled, EnableOperation), None);
        assert_eq!(next_state(Fault, Shutdown), None);
        assert_eq!(next_state(FaultReactionActive, FaultReset), None);
    }

    #[test]
    fn test_shortest_path_enable() {
        use DriveTransition::*;
        assert_eq!(
            shortest_path(DriveState::SwitchOnDisabled, DriveState::OperationEnabled),
            Some(vec![Shutdown, SwitchOn, EnableOperation])
        );
        assert_eq!(
            shortest_path(DriveState::OperationEnabled, DriveState::SwitchOnDisabled),
            Some(vec![DisableVoltage])
        );
        assert_eq!(
            shortest_path(DriveState::QuickStopActive, DriveState::SwitchedOn),
            Some(vec![EnableOperation, SwitchOn])
        );
    }

    #[test]
    fn test_shortest_path_trivial_and_unreachable() {
        assert_eq!(
            shortest_path(DriveState::SwitchedOn, DriveState::SwitchedOn),
            Some(vec![])
        );
        // 故障状态只能显式复位
        assert_eq!(
            shortest_path(DriveState::Fault, DriveState::OperationEnabled),
            None
        );
        assert_eq!(
            shortest_path(DriveState::SwitchOnDisabled, DriveState::Fault),
            None
        );
    }

    #[test]
    fn test_status_word_bits() {
        let sw = StatusWord::from_raw(0x0637);
        assert!(sw.ready_to_switch_on());
        assert!(sw.switched_on());
        assert!(sw.operation_enabled());
        assert!(!sw.fault());
        assert!(sw.voltage_enabled());
        assert!(sw.quick_stop());
        assert!(sw.remote());
        assert!(sw.target_reached());
    }

    #[test]
    fn test_modes_of_operation_conversion() {
        assert_eq!(ModesOfOperation::from(1i8), ModesOfOperation::ProfilePosition);
        assert_eq!(ModesOfOperation::from(-5i8), ModesOfOperation::ManufacturerCurrent);
        assert_eq!(ModesOfOperation::from(42i8), ModesOfOperation::Unknown);
        assert_eq!(ModesOfOperation::from(0i8), ModesOfOperation::NoMode);
        assert_eq!(i8::from(ModesOfOperation::ProfileVelocity), 3);
    }
}
