//! SDO 客户端
//!
//! 每个节点一个实例，请求走 `0x600 + id`，响应由读线程通过 [`SdoClient::notify`] 送入。
//!
//! - 快速传输（≤ 4 字节）：一对请求/响应
//! - 分段传输（> 4 字节）：发起帧声明总长度，随后每段 ≤ 7 字节，toggle 位从 0 开始交替
//! - 中止：响应为中止帧时立即失败，携带中止码
//!
//! 同一节点同时最多一个传输在进行，并发调用在传输锁上排队。

use crate::error::SdoError;
use crate::observer::StateObserver;
use crate::sender::SenderSlot;
use canmotion_protocol::ids::{COB_SDO_RX, cob_id};
use canmotion_protocol::sdo::{self, AbortCode, EXPEDITED_MAX, SEGMENT_MAX, SdoResponse, UploadInitiate};
use canmotion_protocol::CanFrame;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 字符串上传的最大长度
pub const MAX_STRING_LEN: usize = 100;

/// 可以按小端序通过 SDO 读写的定长整数
pub trait SdoPrimitive: Sized + Copy {
    const SIZE: usize;
    fn from_le(bytes: &[u8]) -> Self;
    fn to_le(self) -> SmallVec<[u8; 4]>;
}

macro_rules! impl_sdo_primitive {
    ($($t:ty),*) => {
        $(
            impl SdoPrimitive for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                fn to_le(self) -> SmallVec<[u8; 4]> {
                    SmallVec::from_slice(&self.to_le_bytes())
                }
            }
        )*
    };
}

impl_sdo_primitive!(u8, u16, u32, i8, i16, i32);

/// 响应槽位：每个请求恰好接受一个响应
#[derive(Debug, Default)]
struct ResponseSlot {
    awaiting: bool,
    response: Option<[u8; 8]>,
}

/// SDO 客户端
pub struct SdoClient {
    node_id: u8,
    timeout: Duration,
    sender: Arc<SenderSlot>,
    transfer_lock: Mutex<()>,
    slot: StateObserver<ResponseSlot>,
}

impl SdoClient {
    pub fn new(node_id: u8, timeout: Duration, sender: Arc<SenderSlot>) -> Self {
        Self {
            node_id,
            timeout,
            sender,
            transfer_lock: Mutex::new(()),
            slot: StateObserver::new(ResponseSlot::default()),
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 响应入口（读线程调用）
    ///
    /// 仅当有请求在等待且尚未收到响应时接受，返回是否被接受。
    pub fn notify(&self, data: &[u8]) -> bool {
        let Ok(response) = <[u8; 8]>::try_from(data) else {
            warn!(
                "SDO response with {} bytes ignored (node 0x{:02X})",
                data.len(),
                self.node_id
            );
            return false;
        };

        let accepted = self.slot.update(|slot| {
            if slot.awaiting && slot.response.is_none() {
                slot.response = Some(response);
                slot.awaiting = false;
                true
            } else {
                false
            }
        });

        if !accepted {
            debug!("Unsolicited SDO response dropped (node 0x{:02X})", self.node_id);
        }
        accepted
    }

    // ========================================================================
    // 请求/响应
    // ========================================================================

    /// 发送请求并等待一帧原始响应
    fn exchange(&self, request: [u8; 8]) -> Result<[u8; 8], SdoError> {
        self.slot.update(|slot| {
            slot.awaiting = true;
            slot.response = None;
        });

        let frame = CanFrame::new(cob_id(COB_SDO_RX, self.node_id), &request);
        trace!("SDO request {:02X?} (node 0x{:02X})", request, self.node_id);

        if !self.sender.prepare(frame) {
            self.slot.update(|slot| slot.awaiting = false);
            return Err(SdoError::SendFailed { node: self.node_id });
        }

        match self.slot.wait_until(self.timeout, |slot| slot.response.take()) {
            Some(response) => {
                trace!("SDO response {:02X?} (node 0x{:02X})", response, self.node_id);
                Ok(response)
            },
            None => {
                // 释放槽位，迟到的响应会被丢弃
                self.slot.update(|slot| {
                    slot.awaiting = false;
                    slot.response = None;
                });
                warn!(
                    "SDO timeout after {:?} (node 0x{:02X})",
                    self.timeout, self.node_id
                );
                Err(SdoError::Timeout {
                    node: self.node_id,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            },
        }
    }

    /// 请求/响应并分类，中止帧转为 [`SdoError::Abort`]
    fn transfer(&self, request: [u8; 8]) -> Result<SdoResponse, SdoError> {
        let raw = self.exchange(request)?;
        match SdoResponse::parse(&raw)? {
            SdoResponse::Abort {
                index,
                subindex,
                code,
            } => {
                warn!(
                    "SDO transfer abort at 0x{:04X}:{:02X}: {} (node 0x{:02X})",
                    index, subindex, code, self.node_id
                );
                Err(SdoError::Abort {
                    node: self.node_id,
                    code,
                })
            },
            response => Ok(response),
        }
    }

    fn overrun(&self, reason: impl Into<String>) -> SdoError {
        let reason = reason.into();
        warn!("SDO overrun: {} (node 0x{:02X})", reason, self.node_id);
        SdoError::Overrun {
            node: self.node_id,
            reason,
        }
    }

    fn toggle_mismatch(&self, index: u16, subindex: u8) -> SdoError {
        warn!(
            "SDO toggle bit mismatch at 0x{:04X}:{:02X} (node 0x{:02X})",
            index, subindex, self.node_id
        );
        self.abort_transfer(index, subindex, AbortCode::TOGGLE_NOT_ALTERNATED);
        SdoError::ToggleMismatch { node: self.node_id }
    }

    /// 通知从站放弃本次传输，发送失败不影响调用方返回的错误
    fn abort_transfer(&self, index: u16, subindex: u8, code: AbortCode) {
        debug!(
            "SDO abort 0x{:04X}:{:02X} with {} (node 0x{:02X})",
            index, subindex, code, self.node_id
        );
        let frame = CanFrame::new(
            cob_id(COB_SDO_RX, self.node_id),
            &sdo::abort(index, subindex, code),
        );
        self.sender.prepare(frame);
    }

    // ========================================================================
    // 上传（读对象字典）
    // ========================================================================

    /// 读取对象到 `buf`，返回实际字节数
    ///
    /// 快速传输且从站指明长度时按指明长度复制；未指明时复制 `min(4, buf.len())` 字节。
    pub fn upload(&self, index: u16, subindex: u8, buf: &mut [u8]) -> Result<usize, SdoError> {
        let _guard = self.transfer_lock.lock();

        let payload = match self.transfer(sdo::initiate_upload(index, subindex))? {
            SdoResponse::UploadInitiate {
                index: i,
                subindex: s,
                payload,
            } if i == index && s == subindex => payload,
            other => {
                return Err(self.overrun(format!(
                    "unexpected response to upload 0x{index:04X}:{subindex:02X}: {other:?}"
                )));
            },
        };

        match payload {
            UploadInitiate::Expedited { data, size } => {
                let len = size.unwrap_or(EXPEDITED_MAX.min(buf.len()));
                if len > buf.len() {
                    return Err(SdoError::BufferTooSmall {
                        needed: len,
                        available: buf.len(),
                    });
                }
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            },
            UploadInitiate::Segmented { size } => {
                if let Some(size) = size
                    && size as usize > buf.len()
                {
                    self.abort_transfer(index, subindex, AbortCode::OUT_OF_MEMORY);
                    return Err(SdoError::BufferTooSmall {
                        needed: size as usize,
                        available: buf.len(),
                    });
                }
                self.upload_segments(index, subindex, buf, size)
            },
        }
    }

    fn upload_segments(
        &self,
        index: u16,
        subindex: u8,
        buf: &mut [u8],
        declared: Option<u32>,
    ) -> Result<usize, SdoError> {
        debug!(
            "SDO segmented upload 0x{:04X}:{:02X} begin (node 0x{:02X})",
            index, subindex, self.node_id
        );

        let mut toggle = false;
        let mut offset = 0usize;
        loop {
            match self.transfer(sdo::upload_segment(toggle))? {
                SdoResponse::UploadSegment {
                    toggle: echoed,
                    last,
                    data,
                    len,
                } => {
                    if echoed != toggle {
                        return Err(self.toggle_mismatch(index, subindex));
                    }
                    if offset + len > buf.len() {
                        self.abort_transfer(index, subindex, AbortCode::OUT_OF_MEMORY);
                        return Err(SdoError::BufferTooSmall {
                            needed: offset + len,
                            available: buf.len(),
                        });
                    }
                    buf[offset..offset + len].copy_from_slice(&data[..len]);
                    offset += len;
                    if last {
                        break;
                    }
                    toggle = !toggle;
                },
                other => {
                    return Err(self.overrun(format!(
                        "unexpected response to upload segment: {other:?}"
                    )));
                },
            }
        }

        if let Some(declared) = declared
            && declared as usize != offset
        {
            self.abort_transfer(index, subindex, AbortCode::LENGTH_MISMATCH);
            return Err(SdoError::SizeMismatch {
                expected: declared as usize,
                actual: offset,
            });
        }

        debug!(
            "SDO segmented upload 0x{:04X}:{:02X} end, {} bytes (node 0x{:02X})",
            index, subindex, offset, self.node_id
        );
        Ok(offset)
    }

    /// 读取定长整数，长度必须与类型一致
    pub fn upload_value<T: SdoPrimitive>(&self, index: u16, subindex: u8) -> Result<T, SdoError> {
        let mut buf = [0u8; 4];
        let len = self.upload(index, subindex, &mut buf[..T::SIZE])?;
        if len != T::SIZE {
            return Err(SdoError::SizeMismatch {
                expected: T::SIZE,
                actual: len,
            });
        }
        Ok(T::from_le(&buf))
    }

    pub fn upload_u8(&self, index: u16, subindex: u8) -> Result<u8, SdoError> {
        self.upload_value(index, subindex)
    }

    pub fn upload_u16(&self, index: u16, subindex: u8) -> Result<u16, SdoError> {
        self.upload_value(index, subindex)
    }

    pub fn upload_u32(&self, index: u16, subindex: u8) -> Result<u32, SdoError> {
        self.upload_value(index, subindex)
    }

    pub fn upload_i8(&self, index: u16, subindex: u8) -> Result<i8, SdoError> {
        self.upload_value(index, subindex)
    }

    pub fn upload_i16(&self, index: u16, subindex: u8) -> Result<i16, SdoError> {
        self.upload_value(index, subindex)
    }

    pub fn upload_i32(&self, index: u16, subindex: u8) -> Result<i32, SdoError> {
        self.upload_value(index, subindex)
    }

    /// 读取字符串（最长 [`MAX_STRING_LEN`] 字节，遇到 NUL 截断）
    pub fn upload_string(&self, index: u16, subindex: u8) -> Result<String, SdoError> {
        let mut buf = [0u8; MAX_STRING_LEN];
        let len = self.upload(index, subindex, &mut buf)?;
        let end = buf[..len].iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    // ========================================================================
    // 下载（写对象字典）
    // ========================================================================

    /// 写入对象，≤ 4 字节走快速传输，否则分段
    pub fn download(&self, index: u16, subindex: u8, data: &[u8]) -> Result<(), SdoError> {
        if data.is_empty() {
            return Err(SdoError::SizeMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let _guard = self.transfer_lock.lock();

        let request = if data.len() <= EXPEDITED_MAX {
            sdo::initiate_download_expedited(index, subindex, data)
        } else {
            sdo::initiate_download_segmented(index, subindex, data.len() as u32)
        };

        match self.transfer(request)? {
            SdoResponse::DownloadInitiate {
                index: i,
                subindex: s,
            } if i == index && s == subindex => {},
            other => {
                return Err(self.overrun(format!(
                    "unexpected response to download 0x{index:04X}:{subindex:02X}: {other:?}"
                )));
            },
        }

        if data.len() <= EXPEDITED_MAX {
            return Ok(());
        }
        self.download_segments(index, subindex, data)
    }

    fn download_segments(&self, index: u16, subindex: u8, data: &[u8]) -> Result<(), SdoError> {
        debug!(
            "SDO segmented download 0x{:04X}:{:02X} begin, {} bytes (node 0x{:02X})",
            index,
            subindex,
            data.len(),
            self.node_id
        );

        let segments = data.len().div_ceil(SEGMENT_MAX);
        let mut toggle = false;
        for (i, chunk) in data.chunks(SEGMENT_MAX).enumerate() {
            let last = i + 1 == segments;
            match self.transfer(sdo::download_segment(toggle, chunk, last))? {
                SdoResponse::DownloadSegment { toggle: echoed } => {
                    if echoed != toggle {
                        return Err(self.toggle_mismatch(index, subindex));
                    }
                },
                other => {
                    return Err(self.overrun(format!(
                        "unexpected response to download segment: {other:?}"
                    )));
                },
            }
            toggle = !toggle;
        }

        debug!(
            "SDO segmented download 0x{:04X}:{:02X} end (node 0x{:02X})",
            index, subindex, self.node_id
        );
        Ok(())
    }

    pub fn download_value<T: SdoPrimitive>(
        &self,
        index: u16,
        subindex: u8,
        value: T,
    ) -> Result<(), SdoError> {
        self.download(index, subindex, &value.to_le())
    }

    pub fn download_u8(&self, index: u16, subindex: u8, value: u8) -> Result<(), SdoError> {
        self.download_value(index, subindex, value)
    }

    pub fn download_u16(&self, index: u16, subindex: u8, value: u16) -> Result<(), SdoError> {
        self.download_value(index, subindex, value)
    }

    pub fn download_u32(&self, index: u16, subindex: u8, value: u32) -> Result<(), SdoError> {
        self.download_value(index, subindex, value)
    }

    pub fn download_i8(&self, index: u16, subindex: u8, value: i8) -> Result<(), SdoError> {
        self.download_value(index, subindex, value)
    }

    pub fn download_i16(&self, index: u16, subindex: u8, value: i16) -> Result<(), SdoError> {
        self.download_value(index, subindex, value)
    }

    pub fn download_i32(&self, index: u16, subindex: u8, value: i32) -> Result<(), SdoError> {
        self.download_value(index, subindex, value)
    }

    pub fn download_string(&self, index: u16, subindex: u8, value: &str) -> Result<(), SdoError> {
        self.download(index, subindex, value.as_bytes())
    }

    // ========================================================================
    // 其他
    // ========================================================================

    /// 探测节点是否在线：上传 0x0000:00，收到任何响应（包括中止）即成功
    pub fn ping(&self) -> Result<(), SdoError> {
        let _guard = self.transfer_lock.lock();
        self.exchange(sdo::initiate_upload(0x0000, 0x00)).map(|_| ())
    }
}
