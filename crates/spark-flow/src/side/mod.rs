//! # 侧对象（Side）
//!
//! ## 核心意图（Why）
//! - 每个方向的两端各有一个侧对象，分别跟踪缓存单元、需求、关闭与取消；
//! - 四个实例共享两套能力：[`Inputs`]（传输读取侧、上游输入侧）与 [`Outputs`]
//!   （传输写入侧、下游输出侧）。
//!
//! ## 架构定位（Where）
//! - 侧对象由 [`Connection`](crate::connection::Connection) 独占持有，字段只能通过方法修改；
//! - 侧对象从不回引泵，需要对外发出的命令写入 [`Outbox`]，由连接统一转成
//!   [`Effect`](crate::protocol::Effect)。
//!
//! ## 契约（What）
//! - `closed` 一旦置位永不清除；关闭后的取出/发送不会发生，输出侧若被要求在关闭后发送会返回
//!   协议违例错误，由泵转为 `Failed`。

mod downstream;
mod transport;
mod upstream;

pub use downstream::DownstreamOutput;
pub use transport::{TransportInput, TransportOutput};
pub use upstream::UpstreamInput;

use crate::{
    config::FlowConfig,
    error::FlowError,
    protocol::{DownstreamSignal, Payload, TransportCommand, UpstreamCommand},
    transfer::{InputSide, OutputSide, Readiness},
};

/// 侧对象产生的对外命令。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SideEffect {
    /// 传输命令。
    Transport(TransportCommand),
    /// 上游命令。
    Upstream(UpstreamCommand),
    /// 下游信号。
    Downstream(DownstreamSignal),
}

/// 按产生顺序暂存 [`SideEffect`]。
#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<SideEffect>,
}

impl Outbox {
    /// 追加一条传输命令。
    pub fn transport(&mut self, command: TransportCommand) {
        self.effects.push(SideEffect::Transport(command));
    }

    /// 追加一条上游命令。
    pub fn upstream(&mut self, command: UpstreamCommand) {
        self.effects.push(SideEffect::Upstream(command));
    }

    /// 追加一条下游信号。
    pub fn downstream(&mut self, signal: DownstreamSignal) {
        self.effects.push(SideEffect::Downstream(signal));
    }

    /// 取出全部暂存命令。
    pub fn drain(&mut self) -> std::vec::Drain<'_, SideEffect> {
        self.effects.drain(..)
    }

    /// 丢弃全部暂存命令。
    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// 输入侧能力。
pub trait Inputs {
    /// 是否有可取出的单元。
    fn inputs_available(&self) -> bool;

    /// 是否已永久耗尽：关闭且无剩余。
    fn inputs_depleted(&self) -> bool {
        self.is_closed() && !self.inputs_available()
    }

    /// 是否已关闭。
    fn is_closed(&self) -> bool;

    /// 向来源请求补充。
    fn request_more(&mut self, outbox: &mut Outbox);

    /// 取出一个单元，同时触发补充。
    fn dequeue(&mut self, outbox: &mut Outbox) -> Option<Payload>;

    /// 标记来源已正常结束。
    fn complete(&mut self);

    /// 取消，丢弃所有暂存单元。
    fn cancel(&mut self, outbox: &mut Outbox);
}

/// 输出侧能力。
pub trait Outputs {
    /// 是否持有发送许可。
    fn demand_available(&self) -> bool;

    /// 是否已关闭。
    fn is_closed(&self) -> bool;

    /// 发送一个单元并消耗许可；关闭后调用返回错误。
    fn enqueue(&mut self, payload: Payload, outbox: &mut Outbox) -> Result<(), FlowError>;

    /// 正常结束，通知接收方不会再有输出。
    fn complete(&mut self, outbox: &mut Outbox);

    /// 携带原因取消。
    fn cancel(&mut self, cause: &FlowError, outbox: &mut Outbox);
}

/// 一个连接的四个侧对象。
#[derive(Debug)]
pub struct Sides {
    pub transport_input: TransportInput,
    pub transport_output: TransportOutput,
    pub upstream: UpstreamInput,
    pub downstream: DownstreamOutput,
}

impl Sides {
    /// 按配置创建全部侧对象。
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            transport_input: TransportInput::new(),
            transport_output: TransportOutput::new(),
            upstream: UpstreamInput::new(config.input_buffer_size()),
            downstream: DownstreamOutput::new(),
        }
    }

    fn input(&self, side: InputSide) -> &dyn Inputs {
        match side {
            InputSide::Transport => &self.transport_input,
            InputSide::Upstream => &self.upstream,
        }
    }

    fn output(&self, side: OutputSide) -> &dyn Outputs {
        match side {
            OutputSide::Transport => &self.transport_output,
            OutputSide::Downstream => &self.downstream,
        }
    }
}

impl Readiness for Sides {
    fn inputs_available(&self, side: InputSide) -> bool {
        self.input(side).inputs_available()
    }

    fn inputs_depleted(&self, side: InputSide) -> bool {
        self.input(side).inputs_depleted()
    }

    fn demand_available(&self, side: OutputSide) -> bool {
        self.output(side).demand_available()
    }

    fn output_closed(&self, side: OutputSide) -> bool {
        self.output(side).is_closed()
    }
}
