//! 关节操作映射器
//!
//! 把全局关节号解析为（设备，局部轴号），对每个关节调用设备上的原始操作，
//! 结果按逻辑与合并。失败的关节不会回滚其它关节已生效的副作用，
//! 调用方应把 `false` 视为"状态未知"，重试前先重新查询。
//!
//! 分发策略默认顺序执行；[`DeviceMapper::enable_parallelization`] 之后改为线程池并行，
//! 各节点之间不再保证调用顺序。
//!
//! ```rust
//! use canmotion_client::mapper::{DeviceMapper, PositionControl};
//!
//! # fn demo(mapper: &DeviceMapper) -> bool {
//! mapper.map_joint_group::<PositionControl, _>(
//!     |device, joint| device.position_move(joint.local, 10.0),
//!     &[0, 2],
//! )
//! # }
//! ```

mod pool;
mod task;

pub use pool::WorkerPool;
pub use task::{Job, Task};

use crate::capabilities::{
    ControlModeRaw, EncodersRaw, PositionControlRaw, PositionDirectRaw, RawDevice,
    TorqueControlRaw, VelocityControlRaw,
};
use crate::config::MapperConfig;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// 能力标记
// ============================================================================

/// 能力标记：从设备上取出某一组接口的视图
pub trait Capability {
    type Target: ?Sized + Send + Sync + 'static;

    /// 用于日志
    const NAME: &'static str;

    fn view(device: Arc<dyn RawDevice>) -> Option<Arc<Self::Target>>;
}

macro_rules! capability {
    ($marker:ident, $target:ident, $name:literal, $view:ident) => {
        pub struct $marker;

        impl Capability for $marker {
            type Target = dyn $target;
            const NAME: &'static str = $name;

            fn view(device: Arc<dyn RawDevice>) -> Option<Arc<Self::Target>> {
                device.$view()
            }
        }
    };
}

capability!(PositionControl, PositionControlRaw, "position control", as_position_control);
capability!(PositionDirect, PositionDirectRaw, "position direct", as_position_direct);
capability!(VelocityControl, VelocityControlRaw, "velocity control", as_velocity_control);
capability!(TorqueControl, TorqueControlRaw, "torque control", as_torque_control);
capability!(ControlModeCap, ControlModeRaw, "control mode", as_control_mode);
capability!(Encoders, EncodersRaw, "encoders", as_encoders);

// ============================================================================
// 映射器
// ============================================================================

/// 传给操作的关节编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointRef {
    /// 全局关节号
    pub global: usize,
    /// 设备内的轴号
    pub local: usize,
}

struct JointSlot {
    device: usize,
    local: usize,
}

pub struct DeviceMapper {
    devices: Vec<Arc<dyn RawDevice>>,
    joints: Vec<JointSlot>,
    pool: ArcSwapOption<WorkerPool>,
}

impl Default for DeviceMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMapper {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            joints: Vec::new(),
            pool: ArcSwapOption::empty(),
        }
    }

    /// 按配置创建；线程数为 0 时保持顺序分发
    pub fn with_config(config: MapperConfig) -> Self {
        let mapper = Self::new();
        if config.parallel_thread_limit > 0 {
            mapper.enable_parallelization(config.parallel_thread_limit);
        }
        mapper
    }

    /// 挂载设备，返回其第一个轴的全局关节号
    pub fn add_device(&mut self, device: Arc<dyn RawDevice>, axes: usize) -> usize {
        let first = self.joints.len();
        let index = self.devices.len();
        info!(
            "Mapping device {} to joints {}..{}",
            device.name(),
            first,
            first + axes
        );
        self.devices.push(device);
        self.joints
            .extend((0..axes).map(|local| JointSlot { device: index, local }));
        first
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// 关节所属的设备
    pub fn device(&self, joint: usize) -> Option<Arc<dyn RawDevice>> {
        self.joints
            .get(joint)
            .map(|slot| self.devices[slot.device].clone())
    }

    /// 切换为线程池并行分发
    ///
    /// 线程数为 0 或线程创建失败时保持原策略并返回 `false`。
    pub fn enable_parallelization(&self, threads: usize) -> bool {
        if threads == 0 {
            warn!("Parallel dispatch needs at least one thread");
            return false;
        }
        match WorkerPool::new(threads) {
            Ok(pool) => {
                self.pool.store(Some(Arc::new(pool)));
                info!("Parallel joint dispatch enabled ({} threads)", threads);
                true
            },
            Err(e) => {
                error!("Failed to create worker pool: {}", e);
                false
            },
        }
    }

    /// 切回顺序分发
    pub fn disable_parallelization(&self) {
        self.pool.store(None);
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.load().is_some()
    }

    fn new_task(&self) -> Task {
        match self.pool.load_full() {
            Some(pool) => Task::parallel(pool),
            None => Task::sequential(),
        }
    }

    fn resolve<C: Capability>(&self, joint: usize) -> Option<(Arc<C::Target>, JointRef)> {
        let Some(slot) = self.joints.get(joint) else {
            warn!(
                "Joint {} out of range ({} joints mapped)",
                joint,
                self.joints.len()
            );
            return None;
        };
        let device = self.devices[slot.device].clone();
        let name = device.name();
        match C::view(device) {
            Some(target) => Some((
                target,
                JointRef {
                    global: joint,
                    local: slot.local,
                },
            )),
            None => {
                warn!("Device {} (joint {}) has no {} capability", name, joint, C::NAME);
                None
            },
        }
    }

    /// 对单个关节调用操作（总在调用线程上执行）
    pub fn map_single_joint<C, F>(&self, op: F, joint: usize) -> bool
    where
        C: Capability,
        F: Fn(&C::Target, JointRef) -> bool,
    {
        match self.resolve::<C>(joint) {
            Some((target, joint)) => op(&*target, joint),
            None => false,
        }
    }

    /// 对一组关节调用操作，返回逻辑与
    ///
    /// 无法解析的关节记为失败，但不影响其它关节被调用。
    pub fn map_joint_group<C, F>(&self, op: F, joints: &[usize]) -> bool
    where
        C: Capability,
        F: Fn(&C::Target, JointRef) -> bool + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let mut task = self.new_task();
        let mut resolved = true;

        for &joint in joints {
            let Some((target, joint)) = self.resolve::<C>(joint) else {
                resolved = false;
                continue;
            };
            let op = op.clone();
            task.add(move || op(&*target, joint));
        }

        task.dispatch() && resolved
    }

    /// 对全部关节调用操作
    pub fn map_all_joints<C, F>(&self, op: F) -> bool
    where
        C: Capability,
        F: Fn(&C::Target, JointRef) -> bool + Send + Sync + 'static,
    {
        let joints: Vec<usize> = (0..self.joints.len()).collect();
        self.map_joint_group::<C, F>(op, &joints)
    }
}
