use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::{
    error::FlowError,
    protocol::Payload,
    pump::Transfer,
    side::{Inputs, Outbox, Outputs, Sides},
    transfer::{InputSide, OutputSide, Readiness, TransferState},
};

/// 写方向的联合条件：上游有输入且传输有写需求。
pub fn write_state() -> TransferState {
    TransferState::input_and_demand(InputSide::Upstream, OutputSide::Transport)
}

/// 读方向的联合条件：传输有输入且下游有需求。
pub fn read_state() -> TransferState {
    TransferState::input_and_demand(InputSide::Transport, OutputSide::Downstream)
}

macro_rules! delegate_readiness {
    ($ty:ident) => {
        impl Readiness for $ty<'_> {
            fn inputs_available(&self, side: InputSide) -> bool {
                self.sides.inputs_available(side)
            }
            fn inputs_depleted(&self, side: InputSide) -> bool {
                self.sides.inputs_depleted(side)
            }
            fn demand_available(&self, side: OutputSide) -> bool {
                self.sides.demand_available(side)
            }
            fn output_closed(&self, side: OutputSide) -> bool {
                self.sides.output_closed(side)
            }
        }
    };
}

/// 写方向（上游 → 传输）的搬运步骤。
///
/// 一步内取空上游缓冲，把所有元素按到达顺序拼接成一次写入。
pub(crate) struct WriteDirection<'a> {
    pub(crate) sides: &'a mut Sides,
    pub(crate) outbox: &'a mut Outbox,
}

delegate_readiness!(WriteDirection);

impl Transfer for WriteDirection<'_> {
    fn transfer(&mut self) -> Result<TransferState, FlowError> {
        let mut parts = Vec::new();
        while let Some(payload) = self.sides.upstream.dequeue(self.outbox) {
            match payload {
                Payload::Element(bytes) => parts.push(bytes),
                Payload::Chunk(_) => {
                    return Err(FlowError::protocol("transport chunk on the write path"));
                }
            }
        }
        let elements = parts.len();
        let batch = concat(parts);
        if !batch.is_empty() {
            trace!(elements, bytes = batch.len(), "write batch");
            self.sides
                .transport_output
                .enqueue(Payload::Element(batch), self.outbox)?;
        }
        Ok(write_state())
    }
}

/// 读方向（传输 → 下游）的搬运步骤，每步恰好移动一个块。
pub(crate) struct ReadDirection<'a> {
    pub(crate) sides: &'a mut Sides,
    pub(crate) outbox: &'a mut Outbox,
}

delegate_readiness!(ReadDirection);

impl Transfer for ReadDirection<'_> {
    fn transfer(&mut self) -> Result<TransferState, FlowError> {
        if let Some(payload) = self.sides.transport_input.dequeue(self.outbox) {
            if !matches!(payload, Payload::Chunk(_)) {
                return Err(FlowError::protocol("internal element on the read path"));
            }
            trace!(bytes = payload.len(), "deliver chunk");
            self.sides.downstream.enqueue(payload, self.outbox)?;
        }
        Ok(read_state())
    }
}

fn concat(mut parts: Vec<Bytes>) -> Bytes {
    match parts.len() {
        0 => Bytes::new(),
        1 => parts.pop().unwrap_or_default(),
        _ => {
            let total = parts.iter().map(Bytes::len).sum();
            let mut batch = BytesMut::with_capacity(total);
            for part in &parts {
                batch.extend_from_slice(part);
            }
            batch.freeze()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_preserves_order() {
        let joined = concat(vec![
            Bytes::from_static(b"ab"),
            Bytes::from_static(b""),
            Bytes::from_static(b"cd"),
        ]);
        assert_eq!(&joined[..], b"abcd");
        assert!(concat(Vec::new()).is_empty());
    }
}
