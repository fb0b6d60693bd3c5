//! 驱动层模块
//!
//! 本模块提供单条 CAN 总线的帧调度引擎，包括：
//! - 读/写线程管理（周期轮询，协作式停止）
//! - 出站帧缓冲（容量受限，部分写入保序，bus-off 丢弃）
//! - 入站帧按节点 ID 分发到 [`CanBusSharer`]
//! - 总线负载统计（仅观测）
//! - 钩子系统：帧转储、自定义回调
//!
//! 大多数用户应通过 `canmotion-client` 的节点对象与映射器使用本层。

mod broker;
mod builder;
pub mod bus_load;
mod error;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod tx_buffer;

pub use broker::CanBusBroker;
pub use builder::{BusBuilder, BusConfig};
pub use bus_load::{BusLoadMonitor, BusLoadSample, frame_bits};
pub use error::DriverError;
pub use hooks::{Direction, DumpedFrame, FrameCallback, FrameDumpHook, HookManager};
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use pipeline::{BusContext, bus_load_loop, reader_loop, writer_loop};
pub use registry::{CanBusSharer, HandlerRegistry};
pub use tx_buffer::{CanSender, FlushOutcome, TxBuffer};
