//! 总线配置与 Builder
//!
//! 提供链式构造 [`CanBusBroker`] 的便捷方式。

use crate::broker::CanBusBroker;
use crate::error::DriverError;
use canmotion_can::CanBus;
use std::time::Duration;

/// 总线调度配置
///
/// # Example
///
/// ```
/// use canmotion_driver::BusConfig;
/// use std::time::Duration;
///
/// let config = BusConfig {
///     rx_delay: Duration::from_micros(500),
///     ..BusConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusConfig {
    /// 读线程单次读取的最大帧数
    pub rx_buffer_size: usize,
    /// 出站缓冲容量（帧）
    pub tx_buffer_size: usize,
    /// 读线程每周期休眠时长
    pub rx_delay: Duration,
    /// 写线程每周期休眠时长
    pub tx_delay: Duration,
    /// 负载统计周期，`None` 表示不统计
    pub bus_load_period: Option<Duration>,
    /// 启动前设置的波特率，`None` 表示沿用总线当前设置
    pub bitrate: Option<u32>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: 500,
            tx_buffer_size: 500,
            rx_delay: Duration::from_millis(1),
            tx_delay: Duration::from_millis(1),
            bus_load_period: None,
            bitrate: None,
        }
    }
}

impl BusConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.rx_buffer_size == 0 {
            return Err(DriverError::InvalidConfig(
                "rx_buffer_size must be positive".into(),
            ));
        }
        if self.tx_buffer_size == 0 {
            return Err(DriverError::InvalidConfig(
                "tx_buffer_size must be positive".into(),
            ));
        }
        if self.rx_delay.is_zero() || self.tx_delay.is_zero() {
            return Err(DriverError::InvalidConfig(
                "rx_delay and tx_delay must be positive".into(),
            ));
        }
        if self.bus_load_period.is_some_and(|p| p.is_zero()) {
            return Err(DriverError::InvalidConfig(
                "bus_load_period must be positive when set".into(),
            ));
        }
        if self.bitrate == Some(0) {
            return Err(DriverError::InvalidConfig("bitrate must be positive".into()));
        }
        Ok(())
    }
}

/// 总线 Builder（链式构造）
///
/// # Example
///
/// ```
/// use canmotion_driver::BusBuilder;
/// use std::time::Duration;
///
/// let config = BusBuilder::new()
///     .tx_buffer_size(64)
///     .bus_load_period(Duration::from_secs(1))
///     .config();
/// assert_eq!(config.tx_buffer_size, 64);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BusBuilder {
    config: BusConfig,
}

impl BusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rx_buffer_size(mut self, size: usize) -> Self {
        self.config.rx_buffer_size = size;
        self
    }

    pub fn tx_buffer_size(mut self, size: usize) -> Self {
        self.config.tx_buffer_size = size;
        self
    }

    pub fn rx_delay(mut self, delay: Duration) -> Self {
        self.config.rx_delay = delay;
        self
    }

    pub fn tx_delay(mut self, delay: Duration) -> Self {
        self.config.tx_delay = delay;
        self
    }

    /// 启用负载统计
    pub fn bus_load_period(mut self, period: Duration) -> Self {
        self.config.bus_load_period = Some(period);
        self
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.config.bitrate = Some(bitrate);
        self
    }

    /// 当前配置（不校验）
    pub fn config(&self) -> BusConfig {
        self.config.clone()
    }

    /// 校验配置并创建调度引擎（线程尚未启动）
    pub fn build<B>(self, bus: B) -> Result<CanBusBroker, DriverError>
    where
        B: CanBus + 'static,
    {
        CanBusBroker::new(Box::new(bus), self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rx_buffer_size, 500);
        assert_eq!(config.bus_load_period, None);
    }

    #[test]
    fn test_invalid_configs() {
        let zero_buffer = BusConfig {
            tx_buffer_size: 0,
            ..BusConfig::default()
        };
        assert!(matches!(
            zero_buffer.validate(),
            Err(DriverError::InvalidConfig(_))
        ));

        let zero_delay = BusBuilder::new().rx_delay(Duration::ZERO).config();
        assert!(zero_delay.validate().is_err());

        let zero_period = BusBuilder::new().bus_load_period(Duration::ZERO).config();
        assert!(zero_period.validate().is_err());

        let zero_bitrate = BusBuilder::new().bitrate(0).config();
        assert!(zero_bitrate.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = BusBuilder::new()
            .rx_buffer_size(32)
            .tx_buffer_size(16)
            .tx_delay(Duration::from_micros(250))
            .bitrate(500_000)
            .config();
        assert_eq!(config.rx_buffer_size, 32);
        assert_eq!(config.tx_buffer_size, 16);
        assert_eq!(config.tx_delay, Duration::from_micros(250));
        assert_eq!(config.bitrate, Some(500_000));
    }
}
