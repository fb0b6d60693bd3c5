//! 节点持有的出站委托槽位

use canmotion_driver::CanSender;
use canmotion_protocol::CanFrame;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// 发送委托槽位
///
/// 节点构造时为空，注册到调度引擎后由 `register_sender` 填入。
/// 同一节点的 SDO 客户端与状态机共享一个槽位。
#[derive(Default)]
pub struct SenderSlot {
    sender: RwLock<Option<Arc<dyn CanSender>>>,
}

impl SenderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, sender: Arc<dyn CanSender>) {
        *self.sender.write() = Some(sender);
    }

    pub fn is_set(&self) -> bool {
        self.sender.read().is_some()
    }

    /// 入队一帧；未注册委托或缓冲区满时返回 `false`
    pub fn prepare(&self, frame: CanFrame) -> bool {
        match self.sender.read().as_ref() {
            Some(sender) => sender.prepare(frame),
            None => {
                warn!("No sender registered, dropping frame 0x{:03X}", frame.id);
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canmotion_driver::TxBuffer;

    #[test]
    fn test_prepare_without_sender_fails() {
        let slot = SenderSlot::new();
        assert!(!slot.is_set());
        assert!(!slot.prepare(CanFrame::new(0x601, &[0x40])));
    }

    #[test]
    fn test_prepare_forwards_to_sender() {
        let slot = SenderSlot::new();
        let buffer = Arc::new(TxBuffer::new(1));
        slot.set(buffer.clone());
        assert!(slot.prepare(CanFrame::new(0x601, &[0x40])));
        assert!(!slot.prepare(CanFrame::new(0x601, &[0x40])));
        assert_eq!(buffer.pending(), 1);
    }
}
