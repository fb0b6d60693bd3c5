//! 单轴 CiA 402 伺服驱动节点
//!
//! [`DriveNode`] 把一个 CANopen 从站挂到调度引擎上：
//!
//! - 入站：TPDO1（状态字 + 运行模式）、TPDO2（错误寄存器）、TPDO3（位置 + 电流）、
//!   EMCY、心跳、SDO 响应，全部在读线程中处理
//! - 出站：控制字走 RPDO1，对象字典读写走 SDO
//!
//! 对外以 `Result` 提供类型化接口，能力 trait 的实现（布尔约定）在边界处记录日志后返回 `false`。

use crate::capabilities::{
    ControlModeRaw, EncodersRaw, PositionControlRaw, PositionDirectRaw, RawDevice,
    TorqueControlRaw, VelocityControlRaw,
};
use crate::config::NodeConfig;
use crate::control_mode::ControlMode;
use crate::drive_status::DriveStatusMachine;
use crate::error::NodeError;
use crate::observer::StateObserver;
use crate::sdo::SdoClient;
use crate::sender::SenderSlot;
use crate::units::{
    GearedEncoder, Passthrough, UnitConversion, decode_fixed_point, decode_signed_fixed_point,
    encode_fixed_point, encode_signed_fixed_point,
};
use arc_swap::ArcSwap;
use canmotion_driver::{CanBusSharer, CanSender};
use canmotion_protocol::{
    CanFrame, DriveState, DriveTransition, EmergencyMessage, ErrorPdo, FunctionCode,
    INDEX_INTERPOLATION_DATA, INDEX_MODES_OF_OPERATION, INDEX_PROFILE_ACCELERATION,
    INDEX_PROFILE_VELOCITY, INDEX_STATUSWORD, INDEX_TARGET_POSITION, INDEX_TARGET_VELOCITY,
    ModesOfOperation, MotionPdo, NmtCommand, NmtState, StatusPdo, parse_statusword,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// 对象字典与控制位
// ============================================================================

/// 外部给定值（电流，16.16 定点，单位 A）
pub const INDEX_EXTERNAL_REFERENCE: u16 = 0x201C;
/// 外部给定来源：1 = 经 0x201C 在线给定
pub const INDEX_EXTERNAL_REFERENCE_TYPE: u16 = 0x201D;

/// 轮廓位置：新设定点；插补位置：插补使能
const CW_NEW_SETPOINT: u16 = 1 << 4;
const CW_RELATIVE: u16 = 1 << 6;
const CW_HALT: u16 = 1 << 8;
/// Bit 4-6：模式相关位，切换模式前清零
const CW_MODE_SPECIFIC: u16 = 0x0070;

const SW_TARGET_REACHED: u16 = 1 << 10;
/// 轮廓位置模式下的设定点确认
const SW_SETPOINT_ACK: u16 = 1 << 12;

// ============================================================================
// 状态快照
// ============================================================================

/// 读线程发布的遥测快照
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeTelemetry {
    pub statusword: u16,
    pub manufacturer_status: u16,
    pub modes_of_operation: ModesOfOperation,
    pub motion_error: u16,
    pub detailed_error: u16,
    /// 驱动器内部单位
    pub position: i32,
    /// 驱动器内部单位
    pub current: i16,
    pub nmt: Option<NmtState>,
    pub last_emergency: Option<u16>,
}

/// 控制模式：实际值与请求值在同一把锁下更新
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ModeState {
    actual: ControlMode,
    requested: ControlMode,
}

/// 驱动器上报的运行模式 → 控制模式
fn mode_from_operation(reported: ModesOfOperation, requested: ControlMode) -> ControlMode {
    match reported {
        ModesOfOperation::ProfilePosition => ControlMode::Position,
        ModesOfOperation::ProfileVelocity | ModesOfOperation::CyclicSyncVelocity => {
            ControlMode::Velocity
        },
        ModesOfOperation::InterpolatedPosition | ModesOfOperation::CyclicSyncPosition => {
            ControlMode::PositionDirect
        },
        ModesOfOperation::ManufacturerCurrent if requested == ControlMode::Current => {
            ControlMode::Current
        },
        ModesOfOperation::ManufacturerCurrent
        | ModesOfOperation::ProfileTorque
        | ModesOfOperation::CyclicSyncTorque => ControlMode::Torque,
        _ => ControlMode::Unknown,
    }
}

/// 驱动状态优先于运行模式
fn derive_mode(state: DriveState, reported: ModesOfOperation, requested: ControlMode) -> ControlMode {
    match state {
        DriveState::Fault | DriveState::FaultReactionActive => ControlMode::HwFault,
        DriveState::SwitchedOn => ControlMode::Idle,
        _ => mode_from_operation(reported, requested),
    }
}

/// 请求某控制模式时写入 0x6060 的值
fn operation_for(mode: ControlMode) -> Option<ModesOfOperation> {
    match mode {
        ControlMode::Position => Some(ModesOfOperation::ProfilePosition),
        ControlMode::Velocity => Some(ModesOfOperation::ProfileVelocity),
        ControlMode::PositionDirect => Some(ModesOfOperation::InterpolatedPosition),
        ControlMode::Torque | ControlMode::Current => Some(ModesOfOperation::ManufacturerCurrent),
        _ => None,
    }
}

// ============================================================================
// DriveNode
// ============================================================================

pub struct DriveNode {
    config: NodeConfig,
    units: Arc<dyn UnitConversion>,
    sender: Arc<SenderSlot>,
    sdo: SdoClient,
    drive: DriveStatusMachine,
    telemetry: ArcSwap<NodeTelemetry>,
    modes: StateObserver<ModeState>,
    /// 最近一次直接位置给定（度）
    direct_ref: Mutex<Option<f64>>,
}

impl DriveNode {
    pub fn new(config: NodeConfig) -> Self {
        Self::with_units(config, Arc::new(Passthrough))
    }

    /// 按配置中的减速比和编码器线数换算角度
    pub fn geared(config: NodeConfig) -> Self {
        let units = GearedEncoder::from_config(&config);
        Self::with_units(config, Arc::new(units))
    }

    pub fn with_units(config: NodeConfig, units: Arc<dyn UnitConversion>) -> Self {
        let sender = Arc::new(SenderSlot::new());
        let node_id = config.can_id;
        Self {
            sdo: SdoClient::new(node_id, config.sdo_timeout, sender.clone()),
            drive: DriveStatusMachine::new(node_id, config.drive_state_timeout, sender.clone()),
            config,
            units,
            sender,
            telemetry: ArcSwap::from_pointee(NodeTelemetry::default()),
            modes: StateObserver::new(ModeState::default()),
            direct_ref: Mutex::new(None),
        }
    }

    pub fn node_id(&self) -> u8 {
        self.config.can_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn sdo(&self) -> &SdoClient {
        &self.sdo
    }

    pub fn drive(&self) -> &DriveStatusMachine {
        &self.drive
    }

    /// 最近一次遥测快照
    pub fn telemetry(&self) -> Arc<NodeTelemetry> {
        self.telemetry.load_full()
    }

    pub fn control_mode(&self) -> ControlMode {
        self.modes.read(|modes| modes.actual)
    }

    fn publish(&self, f: impl FnOnce(&mut NodeTelemetry)) {
        let mut snapshot = **self.telemetry.load();
        f(&mut snapshot);
        self.telemetry.store(Arc::new(snapshot));
    }

    fn send(&self, frame: CanFrame) -> Result<(), NodeError> {
        if self.sender.prepare(frame) {
            Ok(())
        } else {
            Err(NodeError::SendFailed {
                node: self.node_id(),
            })
        }
    }

    fn require_mode(&self, operation: &str, allowed: &[ControlMode]) -> Result<(), NodeError> {
        let actual = self.control_mode();
        if allowed.contains(&actual) {
            Ok(())
        } else {
            Err(NodeError::Rejected(format!(
                "{} not available in {} mode",
                operation, actual
            )))
        }
    }

    fn require_finite(what: &str, value: f64) -> Result<(), NodeError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(NodeError::Rejected(format!("{} {} is not finite", what, value)))
        }
    }

    // ------------------------------------------------------------------------
    // 生命周期
    // ------------------------------------------------------------------------

    /// 上线：SDO 探测、读取状态字、NMT 启动、写入轮廓速度/加速度
    pub fn configure(&self) -> Result<(), NodeError> {
        self.sdo.ping()?;

        let statusword = self.sdo.upload_u16(INDEX_STATUSWORD, 0)?;
        let state = self.drive.update(statusword);

        self.send(NmtCommand::Start.frame(self.node_id()))?;

        self.write_ref_speed(self.config.ref_speed)?;
        self.write_ref_acceleration(self.config.ref_acceleration)?;

        let reported = self.telemetry.load().modes_of_operation;
        let mode = self.modes.update(|modes| {
            modes.actual = derive_mode(state, reported, modes.requested);
            modes.requested = modes.actual;
            modes.actual
        });

        info!(
            "Node 0x{:02X} configured: drive {}, control mode {}",
            self.node_id(),
            state,
            mode
        );
        Ok(())
    }

    /// 下线：退回 SWITCH_ON_DISABLED，发送 NMT 停止
    ///
    /// 两步都会尝试执行，返回第一个错误。
    pub fn shutdown(&self) -> Result<(), NodeError> {
        let disabled = self
            .drive
            .request_state(DriveState::SwitchOnDisabled)
            .map_err(NodeError::from);
        let stopped = self.send(NmtCommand::Stop.frame(self.node_id()));

        self.modes.update(|modes| *modes = ModeState::default());
        disabled.and(stopped)
    }

    // ------------------------------------------------------------------------
    // 控制模式
    // ------------------------------------------------------------------------

    /// 切换控制模式
    ///
    /// 运动模式先进入 OPERATION_ENABLED，再写 0x6060，然后等待上报的模式一致。
    pub fn switch_mode(&self, mode: ControlMode) -> Result<(), NodeError> {
        let actual = self.control_mode();
        match (mode, actual) {
            (ControlMode::HwFault | ControlMode::NotConfigured | ControlMode::Unknown, _) => {
                return Err(NodeError::Rejected(format!("{} cannot be requested", mode)));
            },
            (_, ControlMode::NotConfigured) => {
                return Err(NodeError::Rejected("node not configured".to_string()));
            },
            (ControlMode::ForceIdle, _) => {},
            (_, ControlMode::HwFault) => {
                return Err(NodeError::Rejected(
                    "drive in fault, request ForceIdle first".to_string(),
                ));
            },
            _ => {},
        }

        let requested = if mode == ControlMode::ForceIdle {
            ControlMode::Idle
        } else {
            mode
        };
        self.modes.update(|modes| modes.requested = requested);

        if mode.same_drive_mode(actual) {
            self.modes.update(|modes| modes.actual = mode);
            return Ok(());
        }

        debug!(
            "Switching control mode {} -> {} (node 0x{:02X})",
            actual,
            mode,
            self.node_id()
        );

        match mode {
            ControlMode::ForceIdle => {
                if actual == ControlMode::HwFault {
                    self.drive.request_transition(DriveTransition::FaultReset, true)?;
                }
                self.enter_idle()
            },
            ControlMode::Idle => self.enter_idle(),
            _ => {
                let Some(operation) = operation_for(mode) else {
                    return Err(NodeError::Rejected(format!("{} has no drive mode", mode)));
                };
                if self.drive.controlword() & CW_MODE_SPECIFIC != 0 {
                    self.drive.modify_controlword(|cw| cw & !CW_MODE_SPECIFIC)?;
                }
                self.drive.request_state(DriveState::OperationEnabled)?;

                let torque = matches!(mode, ControlMode::Torque | ControlMode::Current);
                if torque {
                    self.sdo.download_u16(INDEX_EXTERNAL_REFERENCE_TYPE, 0, 1)?;
                }
                self.sdo
                    .download_i8(INDEX_MODES_OF_OPERATION, 0, i8::from(operation))?;
                if torque {
                    self.drive.modify_controlword(|cw| cw | CW_NEW_SETPOINT)?;
                }
                self.await_control_mode(mode)
            },
        }
    }

    fn enter_idle(&self) -> Result<(), NodeError> {
        self.drive.request_state(DriveState::SwitchedOn)?;
        self.sdo.download_i8(
            INDEX_MODES_OF_OPERATION,
            0,
            i8::from(ModesOfOperation::NoMode),
        )?;
        Ok(())
    }

    /// 等待读线程上报的控制模式变为 `mode`
    pub fn await_control_mode(&self, mode: ControlMode) -> Result<(), NodeError> {
        self.modes
            .wait_until(self.drive.timeout(), |modes| (modes.actual == mode).then_some(()))
            .ok_or_else(|| NodeError::ModeTimeout {
                node: self.node_id(),
                expected: mode,
                actual: self.control_mode(),
            })
    }

    // ------------------------------------------------------------------------
    // 轮廓参数
    // ------------------------------------------------------------------------

    /// 写入轮廓速度（度/秒，0x6081，16.16 定点）
    pub fn write_ref_speed(&self, speed: f64) -> Result<(), NodeError> {
        Self::require_finite("reference speed", speed)?;
        if speed < 0.0 {
            return Err(NodeError::Rejected(format!(
                "reference speed {} is negative",
                speed
            )));
        }
        if speed > self.config.max_vel {
            return Err(NodeError::Rejected(format!(
                "reference speed {} exceeds maximum {}",
                speed, self.config.max_vel
            )));
        }
        let internal = self.units.degrees_to_internal(speed, 1).abs();
        self.sdo
            .download_u32(INDEX_PROFILE_VELOCITY, 0, encode_fixed_point(internal))?;
        Ok(())
    }

    /// 写入轮廓加速度（度/秒²，0x6083，16.16 定点）
    pub fn write_ref_acceleration(&self, acceleration: f64) -> Result<(), NodeError> {
        Self::require_finite("reference acceleration", acceleration)?;
        if acceleration < 0.0 {
            return Err(NodeError::Rejected(format!(
                "reference acceleration {} is negative",
                acceleration
            )));
        }
        let internal = self.units.degrees_to_internal(acceleration, 2).abs();
        self.sdo
            .download_u32(INDEX_PROFILE_ACCELERATION, 0, encode_fixed_point(internal))?;
        Ok(())
    }

    pub fn read_ref_speed(&self) -> Result<f64, NodeError> {
        let raw = self.sdo.upload_u32(INDEX_PROFILE_VELOCITY, 0)?;
        Ok(self.units.internal_to_degrees(decode_fixed_point(raw), 1))
    }

    pub fn read_ref_acceleration(&self) -> Result<f64, NodeError> {
        let raw = self.sdo.upload_u32(INDEX_PROFILE_ACCELERATION, 0)?;
        Ok(self.units.internal_to_degrees(decode_fixed_point(raw), 2))
    }

    // ------------------------------------------------------------------------
    // 运动
    // ------------------------------------------------------------------------

    /// 轮廓位置运动；halt 位置位时拒绝
    pub fn move_to(&self, target: f64, relative: bool) -> Result<(), NodeError> {
        Self::require_finite("target", target)?;
        self.require_mode("position move", &[ControlMode::Position])?;

        let controlword = self.drive.controlword();
        if controlword & CW_HALT != 0 {
            return Err(NodeError::Rejected(
                "halt active, call a mode switch or velocity move to release".to_string(),
            ));
        }
        if !relative && !(self.config.min..=self.config.max).contains(&target) {
            return Err(NodeError::Rejected(format!(
                "target {} outside [{}, {}]",
                target, self.config.min, self.config.max
            )));
        }

        // 新设定点需要 Bit 4 的上升沿
        if controlword & CW_NEW_SETPOINT != 0 {
            self.drive.modify_controlword(|cw| cw & !CW_NEW_SETPOINT)?;
        }

        let counts = self.units.degrees_to_internal(target, 0).round() as i32;
        self.sdo.download_i32(INDEX_TARGET_POSITION, 0, counts)?;
        self.drive.modify_controlword(|cw| {
            let cw = cw | CW_NEW_SETPOINT;
            if relative { cw | CW_RELATIVE } else { cw & !CW_RELATIVE }
        })?;
        Ok(())
    }

    pub fn motion_done(&self) -> bool {
        let words = self.drive.words();
        parse_statusword(words.statusword) != DriveState::OperationEnabled
            || words.statusword & SW_TARGET_REACHED != 0
    }

    /// 置位 halt，按轮廓加速度减速
    pub fn halt(&self) -> Result<(), NodeError> {
        self.require_mode("stop", &[ControlMode::Position, ControlMode::Velocity])?;
        self.drive.modify_controlword(|cw| cw | CW_HALT)?;
        Ok(())
    }

    pub fn read_target_position(&self) -> Result<f64, NodeError> {
        let counts = self.sdo.upload_i32(INDEX_TARGET_POSITION, 0)?;
        Ok(self.units.internal_to_degrees(counts as f64, 0))
    }

    /// 直接位置给定（度，0x60C1:01）；首次给定时置位插补使能
    pub fn move_direct(&self, target: f64) -> Result<(), NodeError> {
        Self::require_finite("target", target)?;
        self.require_mode("position direct", &[ControlMode::PositionDirect])?;
        if !(self.config.min..=self.config.max).contains(&target) {
            return Err(NodeError::Rejected(format!(
                "target {} outside [{}, {}]",
                target, self.config.min, self.config.max
            )));
        }

        let counts = self.units.degrees_to_internal(target, 0).round() as i32;
        self.sdo.download_i32(INDEX_INTERPOLATION_DATA, 1, counts)?;
        *self.direct_ref.lock() = Some(target);
        if self.drive.controlword() & CW_NEW_SETPOINT == 0 {
            self.drive.modify_controlword(|cw| cw | CW_NEW_SETPOINT)?;
        }
        Ok(())
    }

    pub fn direct_reference(&self) -> Option<f64> {
        *self.direct_ref.lock()
    }

    /// 速度给定（度/秒，0x60FF）；同时解除 halt
    pub fn move_velocity(&self, velocity: f64) -> Result<(), NodeError> {
        Self::require_finite("velocity", velocity)?;
        self.require_mode("velocity move", &[ControlMode::Velocity])?;
        if velocity.abs() > self.config.max_vel {
            return Err(NodeError::Rejected(format!(
                "velocity {} exceeds maximum {}",
                velocity, self.config.max_vel
            )));
        }

        let internal = self.units.degrees_to_internal(velocity, 1);
        self.sdo.download_i32(
            INDEX_TARGET_VELOCITY,
            0,
            encode_signed_fixed_point(internal),
        )?;
        if self.drive.controlword() & CW_HALT != 0 {
            self.drive.modify_controlword(|cw| cw & !CW_HALT)?;
        }
        Ok(())
    }

    /// 力矩给定（N·m → A，0x201C）
    pub fn write_ref_torque(&self, torque: f64) -> Result<(), NodeError> {
        Self::require_finite("reference torque", torque)?;
        self.require_mode("torque reference", &[ControlMode::Torque, ControlMode::Current])?;
        let current = self.units.torque_to_current(torque);
        self.sdo.download_i32(
            INDEX_EXTERNAL_REFERENCE,
            0,
            encode_signed_fixed_point(current),
        )?;
        Ok(())
    }

    pub fn read_ref_torque(&self) -> Result<f64, NodeError> {
        let raw = self.sdo.upload_i32(INDEX_EXTERNAL_REFERENCE, 0)?;
        Ok(self.units.current_to_torque(decode_signed_fixed_point(raw)))
    }

    // ------------------------------------------------------------------------
    // 入站处理（读线程）
    // ------------------------------------------------------------------------

    fn on_status(&self, frame: &CanFrame) -> bool {
        let pdo = match StatusPdo::try_from(*frame) {
            Ok(pdo) => pdo,
            Err(e) => {
                warn!("Malformed TPDO1 (node 0x{:02X}): {}", self.node_id(), e);
                return false;
            },
        };

        self.publish(|t| {
            t.statusword = pdo.statusword;
            t.manufacturer_status = pdo.manufacturer_status;
            t.modes_of_operation = pdo.modes_of_operation;
        });

        let state = parse_statusword(pdo.statusword);
        let (previous, current) = self.modes.update(|modes| {
            let previous = modes.actual;
            if previous != ControlMode::NotConfigured {
                modes.actual = derive_mode(state, pdo.modes_of_operation, modes.requested);
            }
            (previous, modes.actual)
        });
        if previous != current {
            info!(
                "Control mode: {} -> {} (node 0x{:02X})",
                previous,
                current,
                self.node_id()
            );
        }

        self.drive.update(pdo.statusword);
        self.release_motion_bits(current, pdo.statusword);
        true
    }

    /// 轮廓位置握手：设定点确认后清 Bit 4，到位后清 halt
    fn release_motion_bits(&self, mode: ControlMode, statusword: u16) {
        if mode != ControlMode::Position {
            return;
        }
        let controlword = self.drive.controlword();
        let mut clear = 0;
        if statusword & SW_SETPOINT_ACK != 0 && controlword & CW_NEW_SETPOINT != 0 {
            clear |= CW_NEW_SETPOINT;
        }
        if statusword & SW_TARGET_REACHED != 0 && controlword & CW_HALT != 0 {
            clear |= CW_HALT;
        }
        if clear == 0 {
            return;
        }
        if let Err(e) = self.drive.modify_controlword(|cw| cw & !clear) {
            warn!("Failed to release control bits: {}", e);
        }
    }

    fn on_errors(&self, frame: &CanFrame) -> bool {
        match ErrorPdo::try_from(*frame) {
            Ok(pdo) => {
                let previous = self.telemetry.load().motion_error;
                if pdo.motion_error != previous && pdo.motion_error != 0 {
                    warn!(
                        "Motion error register 0x{:04X}, detailed 0x{:04X} (node 0x{:02X})",
                        pdo.motion_error,
                        pdo.detailed_error,
                        self.node_id()
                    );
                }
                self.publish(|t| {
                    t.motion_error = pdo.motion_error;
                    t.detailed_error = pdo.detailed_error;
                });
                true
            },
            Err(e) => {
                warn!("Malformed TPDO2 (node 0x{:02X}): {}", self.node_id(), e);
                false
            },
        }
    }

    fn on_motion(&self, frame: &CanFrame) -> bool {
        match MotionPdo::try_from(*frame) {
            Ok(pdo) => {
                self.publish(|t| {
                    t.position = pdo.position;
                    t.current = pdo.current;
                });
                true
            },
            Err(e) => {
                warn!("Malformed TPDO3 (node 0x{:02X}): {}", self.node_id(), e);
                false
            },
        }
    }

    fn on_emergency(&self, frame: &CanFrame) -> bool {
        let emcy = match EmergencyMessage::try_from(*frame) {
            Ok(emcy) => emcy,
            Err(e) => {
                warn!("Malformed EMCY (node 0x{:02X}): {}", self.node_id(), e);
                return false;
            },
        };

        let description = emcy.description().unwrap_or("unknown error");
        if emcy.is_reset() {
            info!("EMCY: {} (node 0x{:02X})", description, self.node_id());
        } else {
            error!(
                "EMCY 0x{:04X}: {}, register 0x{:02X} (node 0x{:02X})",
                emcy.code,
                description,
                emcy.register,
                self.node_id()
            );
        }
        self.publish(|t| t.last_emergency = Some(emcy.code));
        true
    }

    fn on_heartbeat(&self, frame: &CanFrame) -> bool {
        match NmtState::from_heartbeat(frame) {
            Ok(state) => {
                let previous = self.telemetry.load().nmt;
                if previous != Some(state) {
                    info!("NMT state: {:?} (node 0x{:02X})", state, self.node_id());
                    self.publish(|t| t.nmt = Some(state));
                }
                true
            },
            Err(e) => {
                warn!("Malformed heartbeat (node 0x{:02X}): {}", self.node_id(), e);
                false
            },
        }
    }

    /// 布尔边界：记录错误并返回 `None`
    fn report<T>(&self, operation: &str, result: Result<T, NodeError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{} failed (node 0x{:02X}): {}", operation, self.node_id(), e);
                None
            },
        }
    }

    fn single_axis(&self, axis: usize) -> bool {
        if axis == 0 {
            true
        } else {
            warn!(
                "Axis {} out of range, node 0x{:02X} drives one axis",
                axis,
                self.node_id()
            );
            false
        }
    }
}

// ============================================================================
// 调度引擎接口
// ============================================================================

impl CanBusSharer for DriveNode {
    fn id(&self) -> u8 {
        self.node_id()
    }

    fn register_sender(&self, sender: Arc<dyn CanSender>) {
        self.sender.set(sender);
    }

    fn notify_message(&self, frame: &CanFrame) -> bool {
        match FunctionCode::from_id(frame.id) {
            FunctionCode::Tpdo(1) => self.on_status(frame),
            FunctionCode::Tpdo(2) => self.on_errors(frame),
            FunctionCode::Tpdo(3) => self.on_motion(frame),
            FunctionCode::Emergency => self.on_emergency(frame),
            FunctionCode::Heartbeat => self.on_heartbeat(frame),
            FunctionCode::SdoResponse => self.sdo.notify(frame.data_slice()),
            _ => false,
        }
    }

    fn initialize(&self) -> bool {
        self.report("initialize", self.configure()).is_some()
    }

    fn finalize(&self) -> bool {
        self.report("finalize", self.shutdown()).is_some()
    }
}

// ============================================================================
// 能力接口
// ============================================================================

impl PositionControlRaw for DriveNode {
    fn position_move(&self, axis: usize, target: f64) -> bool {
        self.single_axis(axis) && self.report("position_move", self.move_to(target, false)).is_some()
    }

    fn relative_move(&self, axis: usize, delta: f64) -> bool {
        self.single_axis(axis) && self.report("relative_move", self.move_to(delta, true)).is_some()
    }

    fn check_motion_done(&self, axis: usize) -> Option<bool> {
        self.single_axis(axis).then(|| self.motion_done())
    }

    fn set_ref_speed(&self, axis: usize, speed: f64) -> bool {
        self.single_axis(axis) && self.report("set_ref_speed", self.write_ref_speed(speed)).is_some()
    }

    fn set_ref_acceleration(&self, axis: usize, acceleration: f64) -> bool {
        self.single_axis(axis)
            && self
                .report(
                    "set_ref_acceleration",
                    self.write_ref_acceleration(acceleration),
                )
                .is_some()
    }

    fn stop(&self, axis: usize) -> bool {
        self.single_axis(axis) && self.report("stop", self.halt()).is_some()
    }

    fn target_position(&self, axis: usize) -> Option<f64> {
        if !self.single_axis(axis) {
            return None;
        }
        self.report("target_position", self.read_target_position())
    }
}

impl PositionDirectRaw for DriveNode {
    fn set_position(&self, axis: usize, target: f64) -> bool {
        self.single_axis(axis) && self.report("set_position", self.move_direct(target)).is_some()
    }

    fn ref_position(&self, axis: usize) -> Option<f64> {
        if !self.single_axis(axis) {
            return None;
        }
        self.direct_reference()
    }
}

impl VelocityControlRaw for DriveNode {
    fn velocity_move(&self, axis: usize, velocity: f64) -> bool {
        self.single_axis(axis)
            && self
                .report("velocity_move", self.move_velocity(velocity))
                .is_some()
    }
}

impl TorqueControlRaw for DriveNode {
    fn set_ref_torque(&self, axis: usize, torque: f64) -> bool {
        self.single_axis(axis)
            && self
                .report("set_ref_torque", self.write_ref_torque(torque))
                .is_some()
    }

    fn ref_torque(&self, axis: usize) -> Option<f64> {
        if !self.single_axis(axis) {
            return None;
        }
        self.report("ref_torque", self.read_ref_torque())
    }

    fn torque(&self, axis: usize) -> Option<f64> {
        self.single_axis(axis).then(|| {
            self.units
                .current_to_torque(self.telemetry.load().current as f64)
        })
    }
}

impl ControlModeRaw for DriveNode {
    fn control_mode(&self, axis: usize) -> Option<ControlMode> {
        self.single_axis(axis).then(|| DriveNode::control_mode(self))
    }

    fn set_control_mode(&self, axis: usize, mode: ControlMode) -> bool {
        self.single_axis(axis) && self.report("set_control_mode", self.switch_mode(mode)).is_some()
    }
}

impl EncodersRaw for DriveNode {
    fn encoder(&self, axis: usize) -> Option<f64> {
        self.single_axis(axis).then(|| {
            self.units
                .internal_to_degrees(self.telemetry.load().position as f64, 0)
        })
    }
}

impl RawDevice for DriveNode {
    fn name(&self) -> String {
        format!("drive 0x{:02X}", self.node_id())
    }

    fn as_position_control(self: Arc<Self>) -> Option<Arc<dyn PositionControlRaw>> {
        Some(self)
    }

    fn as_position_direct(self: Arc<Self>) -> Option<Arc<dyn PositionDirectRaw>> {
        Some(self)
    }

    fn as_velocity_control(self: Arc<Self>) -> Option<Arc<dyn VelocityControlRaw>> {
        Some(self)
    }

    fn as_torque_control(self: Arc<Self>) -> Option<Arc<dyn TorqueControlRaw>> {
        Some(self)
    }

    fn as_control_mode(self: Arc<Self>) -> Option<Arc<dyn ControlModeRaw>> {
        Some(self)
    }

    fn as_encoders(self: Arc<Self>) -> Option<Arc<dyn EncodersRaw>> {
        Some(self)
    }
}
