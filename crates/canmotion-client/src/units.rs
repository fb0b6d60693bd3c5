//! 单位换算接口
//!
//! 物理单位换算由上层提供，节点只把数值原样传过这个接口。
//! [`GearedEncoder`] 按减速比和编码器线数把关节角度换算成电机侧计数。

use crate::config::NodeConfig;

/// 单位换算（度 ↔ 驱动器计数，力矩 ↔ 电流）
///
/// `order` 为导数阶数：0 位置，1 速度，2 加速度。
pub trait UnitConversion: Send + Sync {
    fn degrees_to_internal(&self, value: f64, order: u8) -> f64;
    fn internal_to_degrees(&self, value: f64, order: u8) -> f64;
    fn torque_to_current(&self, torque: f64) -> f64;
    fn current_to_torque(&self, current: f64) -> f64;
}

/// 恒等换算
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl UnitConversion for Passthrough {
    fn degrees_to_internal(&self, value: f64, _order: u8) -> f64 {
        value
    }

    fn internal_to_degrees(&self, value: f64, _order: u8) -> f64 {
        value
    }

    fn torque_to_current(&self, torque: f64) -> f64 {
        torque
    }

    fn current_to_torque(&self, current: f64) -> f64 {
        current
    }
}

/// 减速器 + 编码器换算
///
/// 每度计数 = `tr * encoder_pulses / 360`，速度、加速度按同一系数（每秒）换算。
/// 配置中没有力矩常数，力矩与电流不做缩放。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearedEncoder {
    counts_per_degree: f64,
}

impl GearedEncoder {
    pub fn new(tr: f64, encoder_pulses: u32) -> Self {
        Self {
            counts_per_degree: tr * encoder_pulses as f64 / 360.0,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.tr, config.encoder_pulses)
    }

    pub fn counts_per_degree(&self) -> f64 {
        self.counts_per_degree
    }
}

impl UnitConversion for GearedEncoder {
    fn degrees_to_internal(&self, value: f64, _order: u8) -> f64 {
        value * self.counts_per_degree
    }

    fn internal_to_degrees(&self, value: f64, _order: u8) -> f64 {
        value / self.counts_per_degree
    }

    fn torque_to_current(&self, torque: f64) -> f64 {
        torque
    }

    fn current_to_torque(&self, current: f64) -> f64 {
        current
    }
}

/// 编码为 16.16 定点数（高 16 位整数部分，低 16 位小数部分）
///
/// 超出范围的值饱和到 `[0, 65535.99998]`。
pub fn encode_fixed_point(value: f64) -> u32 {
    let scaled = (value * 65536.0).round();
    scaled.clamp(0.0, u32::MAX as f64) as u32
}

/// 解码 16.16 定点数
pub fn decode_fixed_point(raw: u32) -> f64 {
    let integer = (raw >> 16) as f64;
    let fraction = (raw & 0xFFFF) as f64 / 65536.0;
    integer + fraction
}

/// 有符号 16.16 定点数（外部电流给定 0x201C 使用）
pub fn encode_signed_fixed_point(value: f64) -> i32 {
    let scaled = (value * 65536.0).round();
    scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

pub fn decode_signed_fixed_point(raw: i32) -> f64 {
    raw as f64 / 65536.0
}
