//! CANmotion SDK - CANopen / CiA 402 运动控制
//!
//! 在一条 CAN 总线上驱动多个 CiA 402 伺服节点：帧调度、SDO 读写、
//! 驱动状态机以及多设备的关节操作映射。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 帧、COB-ID、SDO 命令字、CiA 402 位域，纯编解码
//! - **CAN 层** (`can`): 非阻塞总线句柄接口，`mock` 特性提供内存总线
//! - **驱动层** (`driver`): 读/写线程、出站缓冲、按节点 ID 分发
//! - **客户端层** (`client`): SDO 客户端、驱动状态机、伺服节点、关节映射器
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use canmotion_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! # fn demo(bus: impl CanBus + 'static, config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
//! canmotion_sdk::init_logger();
//!
//! let mut broker = BusBuilder::new().build(bus)?;
//! let node = Arc::new(DriveNode::new(config));
//! broker.register(node.clone())?;
//! broker.start()?;
//! broker.initialize_nodes();
//!
//! let mut mapper = DeviceMapper::new();
//! mapper.add_device(node, 1);
//! mapper.map_all_joints::<ControlModeCap, _>(|device, joint| {
//!     device.set_control_mode(joint.local, ControlMode::Position)
//! });
//! # Ok(())
//! # }
//! ```

pub use canmotion_can as can;
pub use canmotion_client as client;
pub use canmotion_driver as driver;
pub use canmotion_protocol as protocol;

pub mod prelude;

// 常用类型
pub use canmotion_can::{CanBus, CanError};
pub use canmotion_client::{
    ControlMode, DeviceMapper, DriveNode, MapperConfig, NodeConfig, NodeError, SdoClient,
    SdoError,
};
pub use canmotion_driver::{BusBuilder, BusConfig, CanBusBroker, CanBusSharer, DriverError};
pub use canmotion_protocol::{CanFrame, DriveState, ProtocolError};

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 过滤规则取自 `RUST_LOG`，未设置时为 `info`。`log` 记录经 `tracing-log` 转发。
/// 可重复调用，只有第一次生效。
pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // fmt 订阅者会同时安装 LogTracer，已有全局订阅者时忽略
        if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
            let _ = tracing_log::LogTracer::init();
        }
    });
}
