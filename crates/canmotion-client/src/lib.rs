//! # CANmotion Client
//!
//! 节点层：每个 CANopen 从站一个对象，外加多设备的关节操作映射器。
//!
//! ## 模块
//!
//! - `sdo`: SDO 客户端（快速/分段传输，单节点串行化）
//! - `drive_status`: CiA 402 驱动状态机
//! - `node`: 单轴伺服节点，实现调度引擎接口与全部能力接口
//! - `capabilities`: 按能力分组的设备接口
//! - `mapper`: 全局关节号 → 设备操作，顺序或线程池并行分发
//! - `observer`: 带超时的条件等待原语
//!
//! ## 示例
//!
//! ```rust,no_run
//! use canmotion_client::{ControlMode, DriveNode, NodeConfig};
//! use canmotion_driver::BusBuilder;
//! use std::sync::Arc;
//!
//! # fn demo(bus: impl canmotion_can::CanBus + 'static, config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let mut broker = BusBuilder::new().build(bus)?;
//! let node = Arc::new(DriveNode::new(config));
//! broker.register(node.clone())?;
//! broker.start()?;
//!
//! node.configure()?;
//! node.switch_mode(ControlMode::Position)?;
//! node.move_to(15.0, false)?;
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod config;
pub mod control_mode;
pub mod drive_status;
mod error;
pub mod mapper;
pub mod node;
pub mod observer;
pub mod sdo;
pub mod sender;
pub mod units;

pub use capabilities::{
    ControlModeRaw, EncodersRaw, PositionControlRaw, PositionDirectRaw, RawDevice,
    TorqueControlRaw, VelocityControlRaw,
};
pub use config::{MapperConfig, NodeConfig};
pub use control_mode::ControlMode;
pub use drive_status::{AxisWords, DriveStatusMachine};
pub use error::{ConfigError, DriveError, NodeError, SdoError};
pub use mapper::{
    Capability, ControlModeCap, DeviceMapper, Encoders, JointRef, PositionControl, PositionDirect,
    Task, TorqueControl, VelocityControl, WorkerPool,
};
pub use node::{DriveNode, NodeTelemetry};
pub use observer::StateObserver;
pub use sdo::{MAX_STRING_LEN, SdoClient, SdoPrimitive};
pub use sender::SenderSlot;
pub use units::{GearedEncoder, Passthrough, UnitConversion};
