//! 设备能力接口
//!
//! 每组能力一个 trait，设备只实现自己支持的子集，并通过 [`RawDevice`] 暴露对应视图。
//! 遵循布尔约定：失败时实现方先记录日志，再返回 `false` / `None`。
//! `axis` 为设备内的局部轴号。

use crate::control_mode::ControlMode;
use std::sync::Arc;

/// 位置控制
pub trait PositionControlRaw: Send + Sync {
    /// 绝对位置运动（度）
    fn position_move(&self, axis: usize, target: f64) -> bool;

    /// 相对位置运动（度）
    fn relative_move(&self, axis: usize, delta: f64) -> bool;

    fn check_motion_done(&self, axis: usize) -> Option<bool>;

    /// 轮廓速度（度/秒）
    fn set_ref_speed(&self, axis: usize, speed: f64) -> bool;

    /// 轮廓加速度（度/秒²）
    fn set_ref_acceleration(&self, axis: usize, acceleration: f64) -> bool;

    /// 按轮廓加速度减速停止
    fn stop(&self, axis: usize) -> bool;

    fn target_position(&self, axis: usize) -> Option<f64>;
}

/// 直接位置给定（插补位置模式）
///
/// 给定值立即下发，驱动器不做轮廓规划，调用方负责按周期平滑给定。
pub trait PositionDirectRaw: Send + Sync {
    fn set_position(&self, axis: usize, target: f64) -> bool;

    /// 最近一次成功下发的给定（度）
    fn ref_position(&self, axis: usize) -> Option<f64>;
}

/// 速度控制
pub trait VelocityControlRaw: Send + Sync {
    fn velocity_move(&self, axis: usize, velocity: f64) -> bool;
}

/// 力矩控制
pub trait TorqueControlRaw: Send + Sync {
    fn set_ref_torque(&self, axis: usize, torque: f64) -> bool;
    fn ref_torque(&self, axis: usize) -> Option<f64>;
    /// 由最近一次电流反馈换算的力矩
    fn torque(&self, axis: usize) -> Option<f64>;
}

/// 控制模式切换
pub trait ControlModeRaw: Send + Sync {
    fn control_mode(&self, axis: usize) -> Option<ControlMode>;
    fn set_control_mode(&self, axis: usize, mode: ControlMode) -> bool;
}

/// 编码器读数
pub trait EncodersRaw: Send + Sync {
    /// 最近一次位置反馈（度）
    fn encoder(&self, axis: usize) -> Option<f64>;
}

/// 一个可挂到映射器上的设备
///
/// 默认不支持任何能力，实现方按需覆盖。
pub trait RawDevice: Send + Sync {
    /// 设备名（用于日志）
    fn name(&self) -> String;

    fn as_position_control(self: Arc<Self>) -> Option<Arc<dyn PositionControlRaw>> {
        None
    }

    fn as_position_direct(self: Arc<Self>) -> Option<Arc<dyn PositionDirectRaw>> {
        None
    }

    fn as_velocity_control(self: Arc<Self>) -> Option<Arc<dyn VelocityControlRaw>> {
        None
    }

    fn as_torque_control(self: Arc<Self>) -> Option<Arc<dyn TorqueControlRaw>> {
        None
    }

    fn as_control_mode(self: Arc<Self>) -> Option<Arc<dyn ControlModeRaw>> {
        None
    }

    fn as_encoders(self: Arc<Self>) -> Option<Arc<dyn EncodersRaw>> {
        None
    }
}
