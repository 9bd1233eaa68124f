//! # spark-flow
//!
//! ## 教案式说明
//! - **意图 (Why)**：在字节流传输（如 TCP）与进程内需求驱动的生产/消费端之间建立双向桥接，
//!   任何一侧变慢都会以背压的形式传导到另一侧，不出现无界缓冲；
//! - **架构定位 (Where)**：本 crate 是不做 IO 的纯状态机，只定义消息、侧对象、泵与连接；
//!   真实的套接字与任务调度由 `spark-flow-tcp` 等驱动 crate 负责；
//! - **关键概念 (What)**：
//!   - [`TransferState`]：由“输入可用 / 需求可用”组合出的就绪谓词；
//!   - [`Pump`]：在谓词可执行时反复搬运的通用泵；
//!   - [`side`]：四个侧对象，分别跟踪缓冲、需求与关闭；
//!   - [`Connection`]：连接级状态机，把 [`ConnectionEvent`] 翻译成有序的 [`Effect`]。
//!
//! ## 使用提示
//! - 驱动层为每条连接创建一个 [`Connection`]，先投递握手消息 [`ConnectionEvent::Exposed`]，
//!   再把传输通知与内部信号逐条投递，按顺序执行返回的效果，直到收到 [`Effect::Stop`]。

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod pump;
pub mod side;
pub mod transfer;

pub use config::{DEFAULT_INPUT_BUFFER_SIZE, FlowConfig, MAX_INPUT_BUFFER_SIZE};
pub use connection::{
    Connection, Role,
    lifecycle::{Action, EventKind, Phase, RoleKind},
};
pub use error::{ErrorCategory, FlowError};
pub use protocol::{
    ConnectFailure, ConnectOutcome, ConnectRequest, ConnectionEvent, DownstreamEvent,
    DownstreamSignal, Effect, Payload, Termination, TransportCommand, TransportEvent,
    UpstreamCommand, UpstreamEvent,
};
pub use pump::{Pump, PumpOutcome, Transfer};
pub use transfer::{InputSide, OutputSide, Readiness, TransferState};
