use bytes::Bytes;

use super::{Inputs, Outbox, Outputs};
use crate::{
    error::FlowError,
    protocol::{Payload, TransportCommand},
};

/// 由传输层读取驱动的输入侧。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 传输层以拉取模式投递数据：每发出一次 `ResumeReading` 最多收到一个字节块，
///   因此本侧最多缓存一个单元，读方向的背压自然传导到套接字接收缓冲。
///
/// ## 契约 (What)
/// - `attach`：进入运行态时调用，发出第一次 `ResumeReading`；
/// - `on_received`：缓存新到的块；已关闭时丢弃并继续读取，使传输层能推进到关闭；
/// - `dequeue`：取出缓存块并在未关闭时发出下一次 `ResumeReading`；
/// - `cancel`：连接失败时调用，丢弃缓存块且不再向传输层发出任何命令；
/// - `discard_and_drain`：读方向结束时调用，丢弃缓存块，若因此丢掉了一次读取许可则补发
///   `ResumeReading`，让传输层继续读到关闭。
#[derive(Debug, Default)]
pub struct TransportInput {
    pending: Option<Bytes>,
    closed: bool,
    attached: bool,
}

impl TransportInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定到已连接的传输，并预取第一个块。
    pub fn attach(&mut self, outbox: &mut Outbox) {
        self.attached = true;
        if !self.closed {
            self.request_more(outbox);
        }
    }

    /// 缓存新到达的块。
    pub fn on_received(&mut self, data: Bytes, outbox: &mut Outbox) -> Result<(), FlowError> {
        if self.closed {
            outbox.transport(TransportCommand::ResumeReading);
            return Ok(());
        }
        if self.pending.is_some() {
            return Err(FlowError::protocol(
                "transport delivered a chunk without a pending read request",
            ));
        }
        self.pending = Some(data);
        Ok(())
    }

    /// 丢弃剩余数据但保持传输层继续读取。
    pub fn discard_and_drain(&mut self, outbox: &mut Outbox) {
        let dropped = self.pending.take().is_some();
        if !self.closed {
            self.closed = true;
            if dropped {
                self.request_more(outbox);
            }
        }
    }
}

impl Inputs for TransportInput {
    fn inputs_available(&self) -> bool {
        self.pending.is_some()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn request_more(&mut self, outbox: &mut Outbox) {
        if self.attached {
            outbox.transport(TransportCommand::ResumeReading);
        }
    }

    fn dequeue(&mut self, outbox: &mut Outbox) -> Option<Payload> {
        let data = self.pending.take()?;
        if !self.closed {
            self.request_more(outbox);
        }
        Some(Payload::Chunk(data))
    }

    fn complete(&mut self) {
        self.closed = true;
    }

    fn cancel(&mut self, _outbox: &mut Outbox) {
        self.pending = None;
        self.closed = true;
    }
}

/// 由传输层写入承接的输出侧。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 传输写路径的唯一流控信号是写确认：同一时刻最多只有一次未确认的写入；
/// - 关闭方式取决于对端是否已半关闭：已半关闭时直接 `Close`，否则 `ConfirmedClose`
///   等待对端确认，保证读方向仍可继续收尾。
///
/// ## 契约 (What)
/// - 未 `attach` 之前没有需求，也不会发出任何命令；
/// - `enqueue` 发出一次 `Write` 并清除需求，直到 `on_write_ack`；
/// - `complete` 与 `cancel` 只生效一次。
#[derive(Debug)]
pub struct TransportOutput {
    closed: bool,
    write_acked: bool,
    attached: bool,
    peer_closed: bool,
}

impl Default for TransportOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOutput {
    pub fn new() -> Self {
        Self {
            closed: false,
            write_acked: true,
            attached: false,
            peer_closed: false,
        }
    }

    /// 绑定到已连接的传输。
    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// 上一次写入已被确认。
    pub fn on_write_ack(&mut self) {
        self.write_acked = true;
    }

    /// 对端已半关闭，之后的正常关闭改用 `Close`。
    pub fn note_peer_closed(&mut self) {
        self.peer_closed = true;
    }

    /// 传输层报告连接已关闭。
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// 是否还有未确认的写入。
    pub fn is_flushed(&self) -> bool {
        self.closed || self.write_acked
    }
}

impl Outputs for TransportOutput {
    fn demand_available(&self) -> bool {
        self.attached && !self.closed && self.write_acked
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn enqueue(&mut self, payload: Payload, outbox: &mut Outbox) -> Result<(), FlowError> {
        if self.closed {
            return Err(FlowError::protocol("write issued after the transport output closed"));
        }
        if !self.attached || !self.write_acked {
            return Err(FlowError::protocol("write issued without transport demand"));
        }
        self.write_acked = false;
        outbox.transport(TransportCommand::Write(payload.into_bytes()));
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.attached {
            let command = if self.peer_closed {
                TransportCommand::Close
            } else {
                TransportCommand::ConfirmedClose
            };
            outbox.transport(command);
        }
    }

    fn cancel(&mut self, _cause: &FlowError, outbox: &mut Outbox) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.attached {
            outbox.transport(TransportCommand::Abort);
        }
    }
}
