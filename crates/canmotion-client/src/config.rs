//! 节点配置
//!
//! 从扁平的键值表构造，缺少必填键或取值非法时在构造期失败。
//!
//! | 键 | 含义 | 必填 |
//! |---|---|---|
//! | `canId` | 节点 ID（1..=127） | 是 |
//! | `tr` | 减速比 | 是 |
//! | `min` / `max` | 软限位（度） | 是 |
//! | `maxVel` | 最大速度（度/秒） | 是 |
//! | `refSpeed` / `refAcceleration` | 默认轮廓速度 / 加速度 | 是 |
//! | `encoderPulses` | 编码器线数 | 是 |
//! | `canSdoTimeoutMs` | SDO 超时（毫秒） | 否，默认 25 |
//! | `canDriveStateTimeout` | 状态转换超时（秒） | 否，默认 2.5 |

use crate::error::ConfigError;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SDO_TIMEOUT_MS: f64 = 25.0;
const DEFAULT_DRIVE_STATE_TIMEOUT_S: f64 = 2.5;

/// 单个驱动节点的配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeConfig {
    pub can_id: u8,
    pub tr: f64,
    pub min: f64,
    pub max: f64,
    pub max_vel: f64,
    pub ref_speed: f64,
    pub ref_acceleration: f64,
    pub encoder_pulses: u32,
    pub sdo_timeout: Duration,
    pub drive_state_timeout: Duration,
}

fn required<'a>(map: &'a HashMap<String, String>, key: &'static str) -> Result<&'a str, ConfigError> {
    map.get(key)
        .map(|v| v.trim())
        .ok_or(ConfigError::Missing { key })
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn timeout(seconds: f64, key: &'static str) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(seconds).map_err(|e| invalid(key, seconds, &e.to_string()))
}

impl NodeConfig {
    /// 从键值表构造并校验
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let sdo_timeout_ms = match map.get("canSdoTimeoutMs") {
            Some(raw) => parse::<f64>("canSdoTimeoutMs", raw.trim())?,
            None => DEFAULT_SDO_TIMEOUT_MS,
        };
        let drive_state_timeout_s = match map.get("canDriveStateTimeout") {
            Some(raw) => parse::<f64>("canDriveStateTimeout", raw.trim())?,
            None => DEFAULT_DRIVE_STATE_TIMEOUT_S,
        };
        if sdo_timeout_ms <= 0.0 {
            return Err(invalid("canSdoTimeoutMs", sdo_timeout_ms, "must be positive"));
        }
        if drive_state_timeout_s <= 0.0 {
            return Err(invalid(
                "canDriveStateTimeout",
                drive_state_timeout_s,
                "must be positive",
            ));
        }

        let config = Self {
            can_id: parse("canId", required(map, "canId")?)?,
            tr: parse("tr", required(map, "tr")?)?,
            min: parse("min", required(map, "min")?)?,
            max: parse("max", required(map, "max")?)?,
            max_vel: parse("maxVel", required(map, "maxVel")?)?,
            ref_speed: parse("refSpeed", required(map, "refSpeed")?)?,
            ref_acceleration: parse("refAcceleration", required(map, "refAcceleration")?)?,
            encoder_pulses: parse("encoderPulses", required(map, "encoderPulses")?)?,
            sdo_timeout: timeout(sdo_timeout_ms / 1000.0, "canSdoTimeoutMs")?,
            drive_state_timeout: timeout(drive_state_timeout_s, "canDriveStateTimeout")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验取值之间的约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.can_id == 0 || self.can_id > 0x7F {
            return Err(invalid("canId", self.can_id, "must be in 1..=127"));
        }
        for (key, value) in [
            ("tr", self.tr),
            ("min", self.min),
            ("max", self.max),
            ("maxVel", self.max_vel),
            ("refSpeed", self.ref_speed),
            ("refAcceleration", self.ref_acceleration),
        ] {
            if !value.is_finite() {
                return Err(invalid(key, value, "must be finite"));
            }
        }
        if self.min >= self.max {
            return Err(invalid("min", self.min, "must be less than max"));
        }
        if self.tr == 0.0 {
            return Err(invalid("tr", self.tr, "must be non-zero"));
        }
        if self.max_vel <= 0.0 {
            return Err(invalid("maxVel", self.max_vel, "must be positive"));
        }
        if self.ref_speed <= 0.0 {
            return Err(invalid("refSpeed", self.ref_speed, "must be positive"));
        }
        if self.ref_speed > self.max_vel {
            return Err(invalid("refSpeed", self.ref_speed, "must not exceed maxVel"));
        }
        if self.ref_acceleration <= 0.0 {
            return Err(invalid(
                "refAcceleration",
                self.ref_acceleration,
                "must be positive",
            ));
        }
        if self.encoder_pulses == 0 {
            return Err(invalid("encoderPulses", self.encoder_pulses, "must be non-zero"));
        }
        if self.sdo_timeout.is_zero() {
            return Err(invalid("canSdoTimeoutMs", 0, "must be positive"));
        }
        if self.drive_state_timeout.is_zero() {
            return Err(invalid("canDriveStateTimeout", 0, "must be positive"));
        }
        Ok(())
    }
}

/// 映射器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapperConfig {
    /// 并行分发的线程数，0 表示顺序执行
    pub parallel_thread_limit: usize,
}
