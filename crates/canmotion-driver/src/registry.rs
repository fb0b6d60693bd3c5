//! 节点注册与入站帧分发

use crate::error::DriverError;
use crate::tx_buffer::CanSender;
use canmotion_protocol::CanFrame;
use std::collections::HashMap;
use std::sync::Arc;

/// 共享总线的节点
///
/// 每个从站节点（伺服驱动器）实现此接口，由调度引擎按节点 ID 分发入站帧。
/// `notify_message` 在读线程中同步调用，不能无限期阻塞。
pub trait CanBusSharer: Send + Sync {
    /// 节点 ID（7 位）
    fn id(&self) -> u8;

    /// 辅助通道使用的额外 ID
    fn additional_ids(&self) -> Vec<u8> {
        Vec::new()
    }

    /// 注册出站帧委托
    fn register_sender(&self, sender: Arc<dyn CanSender>);

    /// 处理一帧入站数据，返回是否被识别
    fn notify_message(&self, frame: &CanFrame) -> bool;

    /// 节点上线（配置、使能通信）
    fn initialize(&self) -> bool;

    /// 节点下线
    fn finalize(&self) -> bool;
}

/// 节点 ID → 处理者 映射表
///
/// 注册完成后通过 `ArcSwap` 发布给读线程，读线程只读。
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u8, Arc<dyn CanBusSharer>>,
    nodes: Vec<Arc<dyn CanBusSharer>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点：主 ID 与所有额外 ID 都指向同一节点
    ///
    /// # 错误
    ///
    /// 任一 ID 已被占用时返回 [`DriverError::DuplicateNode`]，映射表不变。
    pub fn register(&mut self, node: Arc<dyn CanBusSharer>) -> Result<(), DriverError> {
        let mut ids = vec![node.id()];
        ids.extend(node.additional_ids());

        if let Some(&taken) = ids.iter().find(|id| self.handlers.contains_key(id)) {
            return Err(DriverError::DuplicateNode { id: taken });
        }

        for id in ids {
            self.handlers.insert(id, node.clone());
        }
        self.nodes.push(node);
        Ok(())
    }

    /// 按节点 ID 查找处理者
    pub fn get(&self, id: u8) -> Option<&Arc<dyn CanBusSharer>> {
        self.handlers.get(&id)
    }

    /// 所有已注册的 ID（升序）
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// 所有节点（按注册顺序，不重复）
    pub fn nodes(&self) -> &[Arc<dyn CanBusSharer>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 按 `id & 0x7F` 分发，找不到处理者时返回 `false`（帧被静默丢弃）
    pub fn dispatch(&self, frame: &CanFrame) -> bool {
        match self.handlers.get(&frame.node_id()) {
            Some(handler) => {
                handler.notify_message(frame);
                true
            },
            None => false,
        }
    }
}
