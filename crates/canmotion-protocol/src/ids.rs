//! COB-ID 常量定义和分类
//!
//! CANopen 预定义连接集：COB-ID = 功能码（高 4 位）+ 节点 ID（低 7 位）。

/// 节点 ID 掩码（低 7 位）
pub const NODE_ID_MASK: u16 = 0x7F;

/// 功能码掩码（高 4 位）
pub const FUNCTION_MASK: u16 = 0x780;

/// 合法节点 ID 上限
pub const MAX_NODE_ID: u8 = 0x7F;

// ============================================================================
// 广播报文
// ============================================================================

/// NMT 网络管理命令（仅主站发送）
pub const COB_NMT: u16 = 0x000;

/// SYNC 同步报文
pub const COB_SYNC: u16 = 0x080;

// ============================================================================
// 点对点报文基址（+ 节点 ID）
// ============================================================================

/// 紧急报文
pub const COB_EMCY: u16 = 0x080;

/// 发送 PDO（从站 → 主站）
pub const COB_TPDO1: u16 = 0x180;
pub const COB_TPDO2: u16 = 0x280;
pub const COB_TPDO3: u16 = 0x380;
pub const COB_TPDO4: u16 = 0x480;

/// 接收 PDO（主站 → 从站）
pub const COB_RPDO1: u16 = 0x200;
pub const COB_RPDO2: u16 = 0x300;
pub const COB_RPDO3: u16 = 0x400;
pub const COB_RPDO4: u16 = 0x500;

/// SDO 响应（从站 → 主站）
pub const COB_SDO_TX: u16 = 0x580;

/// SDO 请求（主站 → 从站）
pub const COB_SDO_RX: u16 = 0x600;

/// NMT 心跳 / 启动报文
pub const COB_HEARTBEAT: u16 = 0x700;

/// 组合功能码与节点 ID
pub fn cob_id(function: u16, node_id: u8) -> u16 {
    (function & FUNCTION_MASK) | (node_id as u16 & NODE_ID_MASK)
}

/// 从 COB-ID 中取节点 ID
pub fn node_of(id: u16) -> u8 {
    (id & NODE_ID_MASK) as u8
}

/// 从 COB-ID 中取功能码
pub fn function_of(id: u16) -> u16 {
    id & FUNCTION_MASK
}

// ============================================================================
// 功能码分类
// ============================================================================

/// CANopen 报文类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    Nmt,
    Sync,
    Emergency,
    Tpdo(u8),
    Rpdo(u8),
    SdoResponse,
    SdoRequest,
    Heartbeat,
    Unknown,
}

impl FunctionCode {
    /// 根据 COB-ID 判断报文类别
    ///
    /// SYNC 与 EMCY 共享功能码 0x080，节点 ID 为 0 时视为 SYNC。
    pub fn from_id(id: u16) -> Self {
        match (function_of(id), node_of(id)) {
            (COB_NMT, 0) => FunctionCode::Nmt,
            (COB_SYNC, 0) => FunctionCode::Sync,
            (COB_EMCY, _) => FunctionCode::Emergency,
            (COB_TPDO1, _) => FunctionCode::Tpdo(1),
            (COB_TPDO2, _) => FunctionCode::Tpdo(2),
            (COB_TPDO3, _) => FunctionCode::Tpdo(3),
            (COB_TPDO4, _) => FunctionCode::Tpdo(4),
            (COB_RPDO1, _) => FunctionCode::Rpdo(1),
            (COB_RPDO2, _) => FunctionCode::Rpdo(2),
            (COB_RPDO3, _) => FunctionCode::Rpdo(3),
            (COB_RPDO4, _) => FunctionCode::Rpdo(4),
            (COB_SDO_TX, _) => FunctionCode::SdoResponse,
            (COB_SDO_RX, _) => FunctionCode::SdoRequest,
            (COB_HEARTBEAT, _) => FunctionCode::Heartbeat,
            _ => FunctionCode::Unknown,
        }
    }
}
