//! 总线负载统计
//!
//! 读/写线程累计收发的位数，统计线程按周期折算为相对波特率的占用比。
//! 仅用于观测，不影响读写行为。

use arc_swap::ArcSwap;
use canmotion_protocol::CanFrame;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 标准帧固定开销（SOF、ID、控制、CRC、ACK、EOF、帧间隔），不计位填充
pub const FRAME_OVERHEAD_BITS: u64 = 47;

/// 一帧在总线上占用的位数
pub fn frame_bits(frame: &CanFrame) -> u64 {
    FRAME_OVERHEAD_BITS + 8 * frame.len as u64
}

/// 一个统计周期的负载（1.0 = 满载）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BusLoadSample {
    pub rx_load: f64,
    pub tx_load: f64,
}

impl BusLoadSample {
    pub fn total(&self) -> f64 {
        self.rx_load + self.tx_load
    }
}

/// 总线负载监视器
pub struct BusLoadMonitor {
    bitrate: u32,
    period: Duration,
    rx_bits: AtomicU64,
    tx_bits: AtomicU64,
    last: ArcSwap<BusLoadSample>,
}

impl BusLoadMonitor {
    pub fn new(bitrate: u32, period: Duration) -> Self {
        Self {
            bitrate,
            period,
            rx_bits: AtomicU64::new(0),
            tx_bits: AtomicU64::new(0),
            last: ArcSwap::from_pointee(BusLoadSample::default()),
        }
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    #[inline]
    pub fn record_rx(&self, frame: &CanFrame) {
        self.rx_bits.fetch_add(frame_bits(frame), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tx(&self, frame: &CanFrame) {
        self.tx_bits.fetch_add(frame_bits(frame), Ordering::Relaxed);
    }

    /// 结束一个统计周期：清零计数并发布本周期负载
    pub fn tick(&self) -> BusLoadSample {
        let rx = self.rx_bits.swap(0, Ordering::Relaxed);
        let tx = self.tx_bits.swap(0, Ordering::Relaxed);
        let capacity = self.bitrate as f64 * self.period.as_secs_f64();

        let sample = if capacity > 0.0 {
            BusLoadSample {
                rx_load: rx as f64 / capacity,
                tx_load: tx as f64 / capacity,
            }
        } else {
            BusLoadSample::default()
        };
        self.last.store(Arc::new(sample));
        sample
    }

    /// 最近一个完整周期的负载样本
    pub fn sample(&self) -> BusLoadSample {
        **self.last.load()
    }

    /// 最近一个周期的总负载（收 + 发）
    pub fn load(&self) -> f64 {
        self.sample().total()
    }

    pub fn last_rx_load(&self) -> f64 {
        self.sample().rx_load
    }

    pub fn last_tx_load(&self) -> f64 {
        self.sample().tx_load
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bits() {
        assert_eq!(frame_bits(&CanFrame::new(0x000, &[])), 47);
        assert_eq!(frame_bits(&CanFrame::new(0x605, &[0; 8])), 111);
    }

    #[test]
    fn test_tick_computes_ratio_and_resets() {
        // 1000 bit/s，周期 1 秒：一帧 8 字节 = 111 bit
        let monitor = BusLoadMonitor::new(1000, Duration::from_secs(1));
        let frame = CanFrame::new(0x605, &[0; 8]);
        monitor.record_rx(&frame);
        monitor.record_tx(&frame);
        monitor.record_tx(&frame);

        let sample = monitor.tick();
        assert!((sample.rx_load - 0.111).abs() < 1e-9);
        assert!((sample.tx_load - 0.222).abs() < 1e-9);
        assert!((sample.total() - 0.333).abs() < 1e-9);
        assert_eq!(monitor.sample(), sample);
        assert!((monitor.load() - 0.333).abs() < 1e-9);
        assert!((monitor.last_tx_load() - 0.222).abs() < 1e-9);

        // 新周期从零开始
        assert_eq!(monitor.tick(), BusLoadSample::default());
    }

    #[test]
    fn test_zero_bitrate_reports_zero() {
        let monitor = BusLoadMonitor::new(0, Duration::from_millis(100));
        monitor.record_rx(&CanFrame::new(0x181, &[1, 2]));
        assert_eq!(monitor.tick(), BusLoadSample::default());
    }
}
