//! Prelude 模块
//!
//! ```rust
//! use canmotion_sdk::prelude::*;
//! ```

pub use canmotion_can::{CanBus, CanError};
pub use canmotion_client::{
    Capability, ControlMode, ControlModeCap, ControlModeRaw, DeviceMapper, DriveNode,
    DriveStatusMachine, Encoders, EncodersRaw, JointRef, MapperConfig, NodeConfig, NodeError,
    PositionControl, PositionControlRaw, PositionDirect, PositionDirectRaw, RawDevice, SdoClient,
    SdoError, TorqueControl, TorqueControlRaw, UnitConversion, VelocityControl,
    VelocityControlRaw,
};
pub use canmotion_driver::{
    BusBuilder, BusConfig, CanBusBroker, CanBusSharer, CanSender, DriverError, FrameCallback,
};
pub use canmotion_protocol::{CanFrame, DriveState, DriveTransition, ProtocolError};
