//! SDO 帧编解码（CiA 301 §7.2.4）
//!
//! 仅负责单帧的构建与分类，传输状态（toggle、偏移、超时）由客户端维护。
//!
//! 帧格式：
//!
//! ```text
//! 发起帧:  [cmd] [index lo] [index hi] [subindex] [d0] [d1] [d2] [d3]
//! 分段帧:  [cmd] [d0] [d1] [d2] [d3] [d4] [d5] [d6]
//! ```

use crate::{ProtocolError, read_u16_le, read_u32_le};
use bilge::prelude::*;
use std::fmt;

/// 快速传输单帧最大数据量
pub const EXPEDITED_MAX: usize = 4;

/// 分段传输单帧最大数据量
pub const SEGMENT_MAX: usize = 7;

// ============================================================================
// 命令说明符
// ============================================================================

/// 客户端命令说明符（ccs）
pub mod ccs {
    pub const DOWNLOAD_SEGMENT: u8 = 0;
    pub const INITIATE_DOWNLOAD: u8 = 1;
    pub const INITIATE_UPLOAD: u8 = 2;
    pub const UPLOAD_SEGMENT: u8 = 3;
    pub const ABORT: u8 = 4;
}

/// 服务端命令说明符（scs）
pub mod scs {
    pub const UPLOAD_SEGMENT: u8 = 0;
    pub const DOWNLOAD_SEGMENT: u8 = 1;
    pub const INITIATE_UPLOAD: u8 = 2;
    pub const INITIATE_DOWNLOAD: u8 = 3;
    pub const ABORT: u8 = 4;
}

/// 发起帧命令字节位域
///
/// ```text
/// Bit 0:   s（数据量已指明）
/// Bit 1:   e（快速传输）
/// Bit 2-3: n（快速传输时不含数据的字节数）
/// Bit 4:   保留
/// Bit 5-7: 命令说明符
/// ```
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct InitiateCommand {
    pub size_indicated: bool,
    pub expedited: bool,
    pub n: u2,
    pub unused: bool,
    pub specifier: u3,
}

/// 分段帧命令字节位域
///
/// ```text
/// Bit 0:   c（最后一段）/ 下载确认中保留
/// Bit 1-3: n（不含数据的字节数）
/// Bit 4:   t（toggle）
/// Bit 5-7: 命令说明符
/// ```
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct SegmentCommand {
    pub last: bool,
    pub n: u3,
    pub toggle: bool,
    pub specifier: u3,
}

/// 命令字节中的说明符（Bit 5-7）
pub fn command_specifier(byte: u8) -> u8 {
    byte >> 5
}

// ============================================================================
// 请求构建（主站 → 从站）
// ============================================================================

fn with_header(command: u8, index: u16, subindex: u8) -> [u8; 8] {
    let [lo, hi] = index.to_le_bytes();
    [command, lo, hi, subindex, 0, 0, 0, 0]
}

/// 发起上传请求
pub fn initiate_upload(index: u16, subindex: u8) -> [u8; 8] {
    let mut cmd = InitiateCommand::from(u8::new(0));
    cmd.set_specifier(u3::new(ccs::INITIATE_UPLOAD));
    with_header(u8::from(cmd).value(), index, subindex)
}

/// 请求下一个上传分段
pub fn upload_segment(toggle: bool) -> [u8; 8] {
    let mut cmd = SegmentCommand::from(u8::new(0));
    cmd.set_specifier(u3::new(ccs::UPLOAD_SEGMENT));
    cmd.set_toggle(toggle);
    [u8::from(cmd).value(), 0, 0, 0, 0, 0, 0, 0]
}

/// 快速下载请求（1..=4 字节，超出部分被截断）
pub fn initiate_download_expedited(index: u16, subindex: u8, data: &[u8]) -> [u8; 8] {
    let len = data.len().clamp(1, EXPEDITED_MAX);
    let mut cmd = InitiateCommand::from(u8::new(0));
    cmd.set_specifier(u3::new(ccs::INITIATE_DOWNLOAD));
    cmd.set_expedited(true);
    cmd.set_size_indicated(true);
    cmd.set_n(u2::new((EXPEDITED_MAX - len) as u8));

    let mut frame = with_header(u8::from(cmd).value(), index, subindex);
    let copied = data.len().min(EXPEDITED_MAX);
    frame[4..4 + copied].copy_from_slice(&data[..copied]);
    frame
}

/// 分段下载发起请求，声明总长度
pub fn initiate_download_segmented(index: u16, subindex: u8, size: u32) -> [u8; 8] {
    let mut cmd = InitiateCommand::from(u8::new(0));
    cmd.set_specifier(u3::new(ccs::INITIATE_DOWNLOAD));
    cmd.set_size_indicated(true);

    let mut frame = with_header(u8::from(cmd).value(), index, subindex);
    frame[4..8].copy_from_slice(&size.to_le_bytes());
    frame
}

/// 下载分段（最多 7 字节）
pub fn download_segment(toggle: bool, chunk: &[u8], last: bool) -> [u8; 8] {
    let len = chunk.len().min(SEGMENT_MAX);
    let mut cmd = SegmentCommand::from(u8::new(0));
    cmd.set_specifier(u3::new(ccs::DOWNLOAD_SEGMENT));
    cmd.set_toggle(toggle);
    cmd.set_n(u3::new((SEGMENT_MAX - len) as u8));
    cmd.set_last(last);

    let mut frame = [0u8; 8];
    frame[0] = u8::from(cmd).value();
    frame[1..1 + len].copy_from_slice(&chunk[..len]);
    frame
}

/// 中止传输
pub fn abort(index: u16, subindex: u8, code: AbortCode) -> [u8; 8] {
    let mut frame = with_header(ccs::ABORT << 5, index, subindex);
    frame[4..8].copy_from_slice(&code.0.to_le_bytes());
    frame
}

// ============================================================================
// 响应分类（从站 → 主站）
// ============================================================================

/// 上传发起响应的数据部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadInitiate {
    /// 快速传输：数据已在本帧中，`size` 为 `None` 表示从站未指明长度
    Expedited { data: [u8; 4], size: Option<usize> },
    /// 分段传输：后续需逐段请求，`size` 为声明的总长度
    Segmented { size: Option<u32> },
}

/// 已分类的 SDO 响应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoResponse {
    UploadInitiate {
        index: u16,
        subindex: u8,
        payload: UploadInitiate,
    },
    UploadSegment {
        toggle: bool,
        last: bool,
        data: [u8; 7],
        len: usize,
    },
    DownloadInitiate {
        index: u16,
        subindex: u8,
    },
    DownloadSegment {
        toggle: bool,
    },
    Abort {
        index: u16,
        subindex: u8,
        code: AbortCode,
    },
}

impl SdoResponse {
    /// 解析一帧 SDO 响应
    ///
    /// # 错误
    ///
    /// - 数据不足 8 字节
    /// - 命令说明符不属于服务端响应
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 8 {
            return Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: data.len(),
            });
        }

        let byte0 = data[0];
        match command_specifier(byte0) {
            scs::INITIATE_UPLOAD => {
                let cmd = InitiateCommand::from(u8::new(byte0));
                let payload = if cmd.expedited() {
                    let size = cmd
                        .size_indicated()
                        .then(|| EXPEDITED_MAX - cmd.n().value() as usize);
                    UploadInitiate::Expedited {
                        data: [data[4], data[5], data[6], data[7]],
                        size,
                    }
                } else {
                    let size = if cmd.size_indicated() {
                        Some(read_u32_le(data, 4)?)
                    } else {
                        None
                    };
                    UploadInitiate::Segmented { size }
                };
                Ok(SdoResponse::UploadInitiate {
                    index: read_u16_le(data, 1)?,
                    subindex: data[3],
                    payload,
                })
            },
            scs::UPLOAD_SEGMENT => {
                let cmd = SegmentCommand::from(u8::new(byte0));
                let mut segment = [0u8; 7];
                segment.copy_from_slice(&data[1..8]);
                Ok(SdoResponse::UploadSegment {
                    toggle: cmd.toggle(),
                    last: cmd.last(),
                    data: segment,
                    len: SEGMENT_MAX - cmd.n().value() as usize,
                })
            },
            scs::INITIATE_DOWNLOAD => Ok(SdoResponse::DownloadInitiate {
                index: read_u16_le(data, 1)?,
                subindex: data[3],
            }),
            scs::DOWNLOAD_SEGMENT => {
                let cmd = SegmentCommand::from(u8::new(byte0));
                Ok(SdoResponse::DownloadSegment {
                    toggle: cmd.toggle(),
                })
            },
            scs::ABORT => Ok(SdoResponse::Abort {
                index: read_u16_le(data, 1)?,
                subindex: data[3],
                code: AbortCode(read_u32_le(data, 4)?),
            }),
            other => Err(ProtocolError::InvalidValue {
                field: "scs".to_string(),
                value: other as u32,
            }),
        }
    }
}

// ============================================================================
// 中止码（CiA 301 §7.2.4.3.17）
// ============================================================================

/// SDO 中止码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbortCode(pub u32);

impl AbortCode {
    pub const TOGGLE_NOT_ALTERNATED: AbortCode = AbortCode(0x0503_0000);
    pub const TIMEOUT: AbortCode = AbortCode(0x0504_0000);
    pub const INVALID_COMMAND: AbortCode = AbortCode(0x0504_0001);
    pub const OUT_OF_MEMORY: AbortCode = AbortCode(0x0504_0005);
    pub const NO_OBJECT: AbortCode = AbortCode(0x0602_0000);
    pub const LENGTH_MISMATCH: AbortCode = AbortCode(0x0607_0010);
    pub const GENERAL_ERROR: AbortCode = AbortCode(0x0800_0000);

    /// 原始中止码
    pub fn code(&self) -> u32 {
        self.0
    }

    /// 人类可读的中止原因，未收录的中止码返回 `"unknown"`
    pub fn reason(&self) -> &'static str {
        match self.0 {
            0x0503_0000 => "Toggle bit not alternated",
            0x0504_0000 => "SDO protocol timed out",
            0x0504_0001 => "Client/server command specifier not valid or unknown",
            0x0504_0002 => "Invalid block size (block mode only)",
            0x0504_0003 => "Invalid sequence number (block mode only)",
            0x0504_0004 => "CRC error (block mode only)",
            0x0504_0005 => "Out of memory",
            0x0601_0000 => "Unsupported access to an object",
            0x0601_0001 => "Attempt to read a write only object",
            0x0601_0002 => "Attempt to write a read only object",
            0x0602_0000 => "Object does not exist in the object dictionary",
            0x0604_0041 => "Object cannot be mapped to the PDO",
            0x0604_0042 => {
                "The number and length of the objects to be mapped would exceed PDO length"
            },
            0x0604_0043 => "General parameter incompatibility reason",
            0x0604_0047 => "General internal incompatibility in the device",
            0x0606_0000 => "Access failed due to an hardware error",
            0x0607_0010 => "Data type does not match, length of service parameter does not match",
            0x0607_0012 => "Data type does not match, length of service parameter too high",
            0x0607_0013 => "Data type does not match, length of service parameter too low",
            0x0609_0011 => "Sub-index does not exist",
            0x0609_0030 => "Value range of parameter exceeded (only for write access)",
            0x0609_0031 => "Value of parameter written too high",
            0x0609_0032 => "Value of parameter written too low",
            0x0609_0036 => "Maximum value is less than minimum value",
            0x060A_0023 => "Resource not available: SDO connection",
            0x0800_0000 => "General error",
            0x0800_0020 => "Data cannot be transferred or stored to the application",
            0x0800_0021 => {
                "Data cannot be transferred or stored to the application because of local control"
            },
            0x0800_0022 => {
                "Data cannot be transferred or stored to the application because of the present device state"
            },
            0x0800_0023 => {
                "Object dictionary dynamic generation fails or no object dictionary is present"
            },
            0x0800_0024 => "No data available",
            _ => "unknown",
        }
    }
}

impl fmt::Display for AbortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} ({})", self.0, self.reason())
    }
}

impl From<u32> for AbortCode {
    fn from(code: u32) -> Self {
        AbortCode(code)
    }
}
