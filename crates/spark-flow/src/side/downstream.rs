use super::{Outbox, Outputs};
use crate::{
    error::FlowError,
    protocol::{DownstreamSignal, Payload},
};

/// 面向内部下游消费者的输出侧。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 消费者只会收到自己申请过的元素：`demand` 记录累计未满足的需求，每发送一个元素减一；
/// - 终止信号（`Complete` / `Error`）由 `closed` 守护，保证恰好一次。
///
/// ## 契约 (What)
/// - `on_request(0)` 是协议违例；累计需求饱和到 `u64::MAX`，视为无界；
/// - 消费者取消只关闭本侧，不发出任何终止信号，也不视为故障。
#[derive(Debug, Default)]
pub struct DownstreamOutput {
    demand: u64,
    closed: bool,
    cancelled: bool,
}

impl DownstreamOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 消费者追加需求。
    pub fn on_request(&mut self, n: u64) -> Result<(), FlowError> {
        if n == 0 {
            return Err(FlowError::protocol("downstream requested a non-positive amount"));
        }
        if !self.closed {
            self.demand = self.demand.saturating_add(n);
        }
        Ok(())
    }

    /// 消费者取消。
    pub fn on_cancel(&mut self) {
        if !self.closed {
            self.closed = true;
            self.cancelled = true;
            self.demand = 0;
        }
    }

    /// 是否由消费者取消。
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// 当前未满足的需求。
    pub fn demand(&self) -> u64 {
        self.demand
    }
}

impl Outputs for DownstreamOutput {
    fn demand_available(&self) -> bool {
        !self.closed && self.demand > 0
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn enqueue(&mut self, payload: Payload, outbox: &mut Outbox) -> Result<(), FlowError> {
        if self.closed {
            return Err(FlowError::protocol("element emitted after the downstream closed"));
        }
        if self.demand == 0 {
            return Err(FlowError::protocol("element emitted without downstream demand"));
        }
        if self.demand != u64::MAX {
            self.demand -= 1;
        }
        outbox.downstream(DownstreamSignal::Next(payload.into_bytes()));
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox) {
        if !self.closed {
            self.closed = true;
            outbox.downstream(DownstreamSignal::Complete);
        }
    }

    fn cancel(&mut self, cause: &FlowError, outbox: &mut Outbox) {
        if !self.closed {
            self.closed = true;
            outbox.downstream(DownstreamSignal::Error(cause.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::side::SideEffect;
    use bytes::Bytes;

    #[test]
    fn emits_only_within_demand() {
        let mut outbox = Outbox::default();
        let mut output = DownstreamOutput::new();
        assert!(!output.demand_available());
        output.on_request(1).expect("request");
        output
            .enqueue(Payload::Chunk(Bytes::from_static(b"a")), &mut outbox)
            .expect("within demand");
        assert!(!output.demand_available());
        assert!(
            output
                .enqueue(Payload::Chunk(Bytes::from_static(b"b")), &mut outbox)
                .is_err()
        );
    }

    #[test]
    fn unbounded_demand_saturates() {
        let mut output = DownstreamOutput::new();
        output.on_request(u64::MAX).expect("request");
        output.on_request(5).expect("request");
        assert_eq!(output.demand(), u64::MAX);
        let mut outbox = Outbox::default();
        output
            .enqueue(Payload::Chunk(Bytes::from_static(b"a")), &mut outbox)
            .expect("unbounded");
        assert_eq!(output.demand(), u64::MAX);
    }

    #[test]
    fn zero_request_is_a_violation() {
        let mut output = DownstreamOutput::new();
        assert!(output.on_request(0).is_err());
    }

    #[test]
    fn terminal_signal_exactly_once() {
        let mut outbox = Outbox::default();
        let mut output = DownstreamOutput::new();
        output.complete(&mut outbox);
        output.cancel(&FlowError::Aborted, &mut outbox);
        output.complete(&mut outbox);
        let signals: Vec<_> = outbox.drain().collect();
        assert_eq!(
            signals,
            vec![SideEffect::Downstream(DownstreamSignal::Complete)]
        );
    }

    #[test]
    fn consumer_cancel_is_silent() {
        let mut outbox = Outbox::default();
        let mut output = DownstreamOutput::new();
        output.on_request(3).expect("request");
        output.on_cancel();
        assert!(output.is_closed());
        assert!(output.is_cancelled());
        output.complete(&mut outbox);
        assert!(outbox.is_empty());
    }
}
