//! CiA 402 驱动状态机
//!
//! 状态由状态字推导而非单独存储。控制字经 RPDO1 发送，状态字由读线程经
//! [`DriveStatusMachine::update`] 写入，两者在同一把锁下读写。

use crate::error::DriveError;
use crate::observer::StateObserver;
use crate::sender::SenderSlot;
use canmotion_protocol::{
    DriveState, DriveTransition, controlword_frame, next_state, parse_statusword, shortest_path,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// `request_state` 最多执行的转换次数（状态图中任意两点的最短路径不超过 4 步）
const MAX_PATH_STEPS: usize = 8;

/// 一个轴的控制字 / 状态字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisWords {
    pub controlword: u16,
    pub statusword: u16,
}

/// CiA 402 驱动状态机
pub struct DriveStatusMachine {
    node_id: u8,
    timeout: Duration,
    sender: Arc<SenderSlot>,
    words: StateObserver<AxisWords>,
}

impl DriveStatusMachine {
    pub fn new(node_id: u8, timeout: Duration, sender: Arc<SenderSlot>) -> Self {
        Self {
            node_id,
            timeout,
            sender,
            words: StateObserver::new(AxisWords::default()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 写入最新状态字（读线程调用），返回推导出的状态
    pub fn update(&self, statusword: u16) -> DriveState {
        let (previous, current) = self.words.update(|words| {
            let previous = parse_statusword(words.statusword);
            words.statusword = statusword;
            (previous, parse_statusword(statusword))
        });
        if previous != current {
            debug!(
                "Drive state: {} -> {} (node 0x{:02X})",
                previous, current, self.node_id
            );
        }
        current
    }

    pub fn controlword(&self) -> u16 {
        self.words.read(|words| words.controlword)
    }

    pub fn statusword(&self) -> u16 {
        self.words.read(|words| words.statusword)
    }

    pub fn words(&self) -> AxisWords {
        self.words.get()
    }

    pub fn state(&self) -> DriveState {
        parse_statusword(self.statusword())
    }

    /// 恢复初始值（节点重启后使用）
    pub fn reset(&self) {
        self.words.update(|words| *words = AxisWords::default());
    }

    /// 发送新的控制字，发送成功才更新本地副本
    pub fn set_controlword(&self, controlword: u16) -> Result<(), DriveError> {
        self.modify_controlword(|_| controlword).map(|_| ())
    }

    /// 在锁内基于当前控制字计算并发送新值，返回发送的控制字
    pub fn modify_controlword(&self, f: impl FnOnce(u16) -> u16) -> Result<u16, DriveError> {
        self.words.update(|words| {
            let controlword = f(words.controlword);
            if !self.sender.prepare(controlword_frame(self.node_id, controlword)) {
                return Err(DriveError::SendFailed { node: self.node_id });
            }
            words.controlword = controlword;
            Ok(controlword)
        })
    }

    /// 请求一次状态转换
    ///
    /// 当前状态下无效的转换不会发送。`wait` 为 `true` 时阻塞直到状态字反映目标状态或超时。
    pub fn request_transition(
        &self,
        transition: DriveTransition,
        wait: bool,
    ) -> Result<(), DriveError> {
        let expected = self.words.update(|words| {
            let current = parse_statusword(words.statusword);
            let Some(expected) = next_state(current, transition) else {
                return Err(DriveError::InvalidTransition {
                    from: current,
                    transition,
                });
            };

            let controlword = transition.apply(words.controlword);
            if !self.sender.prepare(controlword_frame(self.node_id, controlword)) {
                return Err(DriveError::SendFailed { node: self.node_id });
            }
            words.controlword = controlword;
            Ok(expected)
        })?;

        debug!(
            "Requested {:?}, expecting {} (node 0x{:02X})",
            transition, expected, self.node_id
        );

        if wait { self.await_state(expected) } else { Ok(()) }
    }

    /// 沿标准状态图逐步转换到目标状态，每一步都等待确认
    ///
    /// 每一步之后按实际状态重新规划路径。
    pub fn request_state(&self, goal: DriveState) -> Result<(), DriveError> {
        for _ in 0..MAX_PATH_STEPS {
            let current = self.state();
            if current == goal {
                return Ok(());
            }
            let path = shortest_path(current, goal).ok_or(DriveError::Unreachable {
                from: current,
                to: goal,
            })?;
            let Some(&step) = path.first() else {
                return Ok(());
            };
            self.request_transition(step, true)?;
        }

        let current = self.state();
        if current == goal {
            Ok(())
        } else {
            Err(DriveError::Unreachable {
                from: current,
                to: goal,
            })
        }
    }

    /// 不发送命令，等待状态到达 `goal`
    pub fn await_state(&self, goal: DriveState) -> Result<(), DriveError> {
        let reached = self.words.wait_until(self.timeout, |words| {
            (parse_statusword(words.statusword) == goal).then_some(())
        });

        reached.ok_or_else(|| DriveError::Timeout {
            node: self.node_id,
            expected: goal,
            actual: self.state(),
        })
    }
}
