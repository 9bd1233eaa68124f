use std::collections::VecDeque;

use bytes::Bytes;

use super::{Inputs, Outbox};
use crate::{
    config::MAX_INPUT_BUFFER_SIZE,
    error::FlowError,
    protocol::{Payload, UpstreamCommand},
};

/// 由内部上游生产者驱动的输入侧：有界的批量预取缓冲。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 写方向的一次搬运会把缓冲内全部元素拼接成一次写入，缓冲越深，等待写确认期间可合并的
///   元素越多；
/// - 需求按批次申请：订阅时申请整个容量，之后空闲槽位达到容量一半（至少 1）时再补一批，
///   避免每取出一个元素就发一次 `Request(1)`。
///
/// ## 契约 (What)
/// - `outstanding` 记录已申请但尚未到达的元素数，`buffer.len() + outstanding <= capacity`；
/// - 超出已申请数量的元素是协议违例；
/// - 重复订阅是协议违例；取消后迟到的元素被静默丢弃。
#[derive(Debug)]
pub struct UpstreamInput {
    buffer: VecDeque<Bytes>,
    capacity: usize,
    outstanding: usize,
    subscribed: bool,
    completed: bool,
    cancelled: bool,
}

impl UpstreamInput {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_INPUT_BUFFER_SIZE);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            outstanding: 0,
            subscribed: false,
            completed: false,
            cancelled: false,
        }
    }

    /// 生产者完成订阅。
    pub fn on_subscribe(&mut self, outbox: &mut Outbox) -> Result<(), FlowError> {
        if self.subscribed {
            return Err(FlowError::protocol("upstream subscribed twice"));
        }
        self.subscribed = true;
        if self.cancelled {
            outbox.upstream(UpstreamCommand::Cancel);
        } else {
            self.request_more(outbox);
        }
        Ok(())
    }

    /// 生产者提交一个元素。
    pub fn on_next(&mut self, element: Bytes) -> Result<(), FlowError> {
        if self.cancelled {
            return Ok(());
        }
        if !self.subscribed || self.completed {
            return Err(FlowError::protocol("upstream element outside an active subscription"));
        }
        if self.outstanding == 0 {
            return Err(FlowError::protocol("upstream element exceeds requested demand"));
        }
        self.outstanding -= 1;
        self.buffer.push_back(element);
        Ok(())
    }

    /// 当前缓存的元素数。
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn free_slots(&self) -> usize {
        self.capacity - self.buffer.len() - self.outstanding
    }

    fn batch_threshold(&self) -> usize {
        (self.capacity / 2).max(1)
    }
}

impl Inputs for UpstreamInput {
    fn inputs_available(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn is_closed(&self) -> bool {
        self.completed || self.cancelled
    }

    fn request_more(&mut self, outbox: &mut Outbox) {
        if !self.subscribed || self.is_closed() {
            return;
        }
        let free = self.free_slots();
        if free >= self.batch_threshold() {
            self.outstanding += free;
            outbox.upstream(UpstreamCommand::Request(free));
        }
    }

    fn dequeue(&mut self, outbox: &mut Outbox) -> Option<Payload> {
        let element = self.buffer.pop_front()?;
        self.request_more(outbox);
        Some(Payload::Element(element))
    }

    fn complete(&mut self) {
        self.completed = true;
        self.outstanding = 0;
    }

    fn cancel(&mut self, outbox: &mut Outbox) {
        self.buffer.clear();
        if self.is_closed() {
            return;
        }
        self.cancelled = true;
        self.outstanding = 0;
        if self.subscribed {
            outbox.upstream(UpstreamCommand::Cancel);
        }
    }
}
