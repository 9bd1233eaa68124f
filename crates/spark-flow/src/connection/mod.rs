//! # 连接状态机
//!
//! ## 核心意图（Why）
//! - 一个 [`Connection`] 桥接一条字节流传输与一对内部生产/消费端：写方向把上游元素合并后写入
//!   传输，读方向把传输读到的块按下游需求逐个投递；
//! - 状态机不做 IO：[`Connection::handle`] 接收一条 [`ConnectionEvent`]，返回一组有序的
//!   [`Effect`]，驱动层（例如 `spark-flow-tcp`）负责落地。
//!
//! ## 架构定位（Where）
//! - 合法跃迁由 [`lifecycle::route`] 决定；两个方向的搬运步骤见 `direction` 子模块；
//! - 侧对象与泵都由连接独占持有，单线程顺序处理，不需要任何锁。
//!
//! ## 关键约束（What）
//! - 每个连接恰好产生一次 [`Effect::Stop`]，之后所有消息都被忽略；
//! - 下游终止信号最多一次，`Next` 的数量不超过下游累计申请的需求；
//! - `Abort` 之后不再产生任何传输命令，`Close`/`ConfirmedClose` 之后不再产生 `Write`。

mod direction;
pub mod lifecycle;

use std::net::SocketAddr;

use tracing::{debug, trace, warn};

use crate::{
    config::FlowConfig,
    error::FlowError,
    protocol::{
        ConnectFailure, ConnectOutcome, ConnectRequest, ConnectionEvent, DownstreamEvent, Effect,
        Termination, TransportCommand, TransportEvent, UpstreamEvent,
    },
    pump::{Pump, PumpOutcome},
    side::{Inputs, Outbox, Outputs, SideEffect, Sides},
};

use direction::{ReadDirection, WriteDirection, read_state, write_state};
use lifecycle::{Action, EventKind, Phase, RoleKind, route};

/// 连接角色。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Role {
    /// 接受方：传输在创建时已连接。
    Accepting,
    /// 连接方：握手后发起建连。
    Connecting(ConnectRequest),
}

impl Role {
    /// 角色种类。
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Accepting => RoleKind::Accepting,
            Role::Connecting(_) => RoleKind::Connecting,
        }
    }
}

/// 背压字节流连接。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 读写两个方向各由一台 [`Pump`] 驱动，泵只在条件可执行时搬运，因此任何一侧的慢速都会
///   自然传导为对另一侧的背压；
/// - 一个方向结束不影响另一个方向，直到传输输出侧与下游输出侧都关闭才停止连接。
///
/// ## 逻辑 (How)
/// - `handle` 先按 `(角色, 阶段, 消息种类)` 查表得到 [`Action`]，再执行对应处理；
/// - 处理中出现的任何错误统一进入 `fail`：按固定顺序取消四个侧对象、通知请求方、发出
///   `Stop(Failed)`；
/// - 每条消息处理完毕后检查是否满足正常停止条件。
///
/// ## 契约 (What)
/// - `E` 为握手消息携带的内部端点，连接方在建连成功时把它原样交还给请求方；
/// - 返回的效果按产生顺序排列，驱动层必须依次执行。
#[derive(Debug)]
pub struct Connection<E> {
    id: u64,
    role: Role,
    phase: Phase,
    sides: Sides,
    write_pump: Pump,
    read_pump: Pump,
    outbox: Outbox,
    effects: Vec<Effect<E>>,
    endpoint: Option<E>,
    requester_pending: bool,
}

impl<E> Connection<E> {
    /// 创建接受方连接。
    pub fn accepting(id: u64, config: &FlowConfig) -> Self {
        Self::with_role(id, Role::Accepting, config)
    }

    /// 创建连接方连接。
    pub fn connecting(id: u64, request: ConnectRequest, config: &FlowConfig) -> Self {
        Self::with_role(id, Role::Connecting(request), config)
    }

    fn with_role(id: u64, role: Role, config: &FlowConfig) -> Self {
        let requester_pending = matches!(role, Role::Connecting(_));
        Self {
            id,
            role,
            phase: Phase::AwaitingExposedInterface,
            sides: Sides::new(config),
            write_pump: Pump::new("write"),
            read_pump: Pump::new("read"),
            outbox: Outbox::default(),
            effects: Vec::new(),
            endpoint: None,
            requester_pending,
        }
    }

    /// 连接标识，仅用于日志。
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 当前阶段。
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 角色。
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// 侧对象的只读视图。
    pub fn sides(&self) -> &Sides {
        &self.sides
    }

    /// 是否已终止。
    pub fn is_terminated(&self) -> bool {
        self.phase.is_terminal()
    }

    /// 处理一条消息并返回需要执行的效果。
    pub fn handle(&mut self, event: ConnectionEvent<E>) -> Vec<Effect<E>> {
        let kind = EventKind::of(&event);
        let action = route(self.role.kind(), self.phase, kind);
        trace!(connection = self.id, phase = ?self.phase, ?kind, ?action, "dispatch");

        let result = match (action, event) {
            (Action::Ignore, _) => Ok(()),
            (Action::Violation, _) => Err(FlowError::protocol(format!(
                "{kind:?} is not expected while {:?}",
                self.phase
            ))),
            (Action::Run, ConnectionEvent::Exposed(_)) => {
                self.start_running();
                self.pump_both()
            }
            (Action::IssueConnect, ConnectionEvent::Exposed(endpoint)) => {
                self.issue_connect(endpoint);
                Ok(())
            }
            (
                Action::Establish,
                ConnectionEvent::Transport(TransportEvent::Connected { remote, local }),
            ) => self.establish(remote, local),
            (
                Action::ConnectFailure,
                ConnectionEvent::Transport(TransportEvent::ConnectFailed(failure)),
            ) => Err(self.connect_failed(failure)),
            (Action::Steady, ConnectionEvent::Transport(event)) => self.on_transport(event),
            (Action::Fail, ConnectionEvent::Transport(event)) => Err(fault_cause(event)),
            (Action::Internal, ConnectionEvent::Upstream(event)) => self.on_upstream(event),
            (Action::Internal, ConnectionEvent::Downstream(event)) => self.on_downstream(event),
            (action, _) => Err(FlowError::protocol(format!(
                "action {action:?} does not apply to {kind:?}"
            ))),
        };

        match result {
            Ok(()) => self.check_shutdown(),
            Err(cause) => self.fail(cause),
        }
        self.flush();
        std::mem::take(&mut self.effects)
    }

    fn issue_connect(&mut self, endpoint: E) {
        self.endpoint = Some(endpoint);
        self.phase = Phase::AwaitingTransport;
        if let Role::Connecting(request) = &self.role {
            debug!(connection = self.id, remote = %request.remote, "connecting");
            self.outbox
                .transport(TransportCommand::Connect(request.clone()));
        }
    }

    /// 登记传输、安装两个方向的条件、预取第一个块。
    fn start_running(&mut self) {
        self.outbox.transport(TransportCommand::Register);
        self.sides.transport_output.attach();
        self.sides.transport_input.attach(&mut self.outbox);
        self.write_pump.set_transfer_state(write_state());
        self.read_pump.set_transfer_state(read_state());
        self.phase = Phase::Running;
        debug!(connection = self.id, "connection running");
    }

    fn establish(&mut self, remote: SocketAddr, local: SocketAddr) -> Result<(), FlowError> {
        let endpoint = self
            .endpoint
            .take()
            .ok_or_else(|| FlowError::protocol("connected without an exposed endpoint"))?;
        self.start_running();
        self.flush();
        self.requester_pending = false;
        self.effects.push(Effect::Requester(ConnectOutcome::Connected {
            remote,
            local,
            endpoint,
        }));
        debug!(connection = self.id, %remote, %local, "connected");
        self.pump_both()
    }

    fn connect_failed(&mut self, failure: ConnectFailure) -> FlowError {
        self.flush();
        self.requester_pending = false;
        let cause = failure.cause.clone();
        self.effects
            .push(Effect::Requester(ConnectOutcome::Failed(failure)));
        cause
    }

    fn on_transport(&mut self, event: TransportEvent) -> Result<(), FlowError> {
        match event {
            TransportEvent::Received(data) => {
                self.sides
                    .transport_input
                    .on_received(data, &mut self.outbox)?;
                self.pump_read()
            }
            TransportEvent::WriteAck => {
                self.sides.transport_output.on_write_ack();
                self.pump_write()
            }
            TransportEvent::PeerClosed => {
                debug!(connection = self.id, "peer closed its write side");
                self.sides.transport_input.complete();
                self.sides.transport_output.note_peer_closed();
                self.pump_read()
            }
            TransportEvent::Closed | TransportEvent::ConfirmedClosed => {
                debug!(connection = self.id, "transport closed");
                self.sides.transport_input.complete();
                self.sides.transport_output.mark_closed();
                self.pump_both()
            }
            other => Err(FlowError::protocol(format!(
                "unexpected transport event {other:?}"
            ))),
        }
    }

    fn on_upstream(&mut self, event: UpstreamEvent) -> Result<(), FlowError> {
        match event {
            UpstreamEvent::OnSubscribe => self.sides.upstream.on_subscribe(&mut self.outbox)?,
            UpstreamEvent::OnNext(element) => self.sides.upstream.on_next(element)?,
            UpstreamEvent::OnComplete => self.sides.upstream.complete(),
            UpstreamEvent::OnError(cause) => return Err(FlowError::UpstreamFailed { cause }),
        }
        self.pump_write()
    }

    fn on_downstream(&mut self, event: DownstreamEvent) -> Result<(), FlowError> {
        match event {
            DownstreamEvent::Request(n) => self.sides.downstream.on_request(n)?,
            DownstreamEvent::Cancel => {
                debug!(connection = self.id, "downstream cancelled");
                self.sides.downstream.on_cancel();
            }
        }
        self.pump_read()
    }

    fn pump_both(&mut self) -> Result<(), FlowError> {
        self.pump_write()?;
        self.pump_read()
    }

    fn pump_write(&mut self) -> Result<(), FlowError> {
        let mut step = WriteDirection {
            sides: &mut self.sides,
            outbox: &mut self.outbox,
        };
        match self.write_pump.pump(&mut step) {
            PumpOutcome::Idle => Ok(()),
            PumpOutcome::Finished => {
                debug!(connection = self.id, "write direction finished");
                self.sides.transport_output.complete(&mut self.outbox);
                self.sides.upstream.cancel(&mut self.outbox);
                Ok(())
            }
            PumpOutcome::Failed(cause) => Err(cause),
        }
    }

    fn pump_read(&mut self) -> Result<(), FlowError> {
        let mut step = ReadDirection {
            sides: &mut self.sides,
            outbox: &mut self.outbox,
        };
        match self.read_pump.pump(&mut step) {
            PumpOutcome::Idle => Ok(()),
            PumpOutcome::Finished => {
                debug!(connection = self.id, "read direction finished");
                self.sides.downstream.complete(&mut self.outbox);
                self.sides.transport_input.discard_and_drain(&mut self.outbox);
                Ok(())
            }
            PumpOutcome::Failed(cause) => Err(cause),
        }
    }

    /// 两个输出侧都已关闭时正常停止。
    fn check_shutdown(&mut self) {
        if self.phase != Phase::Running
            || !self.sides.transport_output.is_closed()
            || !self.sides.downstream.is_closed()
        {
            return;
        }
        self.sides.upstream.cancel(&mut self.outbox);
        self.sides.transport_input.complete();
        self.write_pump.terminate();
        self.read_pump.terminate();
        self.phase = Phase::ShuttingDown;
        self.flush();
        debug!(connection = self.id, "connection completed");
        self.effects.push(Effect::Stop(Termination::Completed));
    }

    /// 连接级失败：取消全部侧对象并停止；重复调用无效果。
    fn fail(&mut self, cause: FlowError) {
        if self.phase.is_terminal() {
            return;
        }
        warn!(
            connection = self.id,
            phase = ?self.phase,
            code = cause.code(),
            error = %cause,
            "connection failed"
        );
        self.sides.transport_input.cancel(&mut self.outbox);
        self.sides
            .transport_output
            .cancel(&cause, &mut self.outbox);
        self.sides.upstream.cancel(&mut self.outbox);
        self.sides.downstream.cancel(&cause, &mut self.outbox);
        self.write_pump.terminate();
        self.read_pump.terminate();
        self.flush();

        if self.requester_pending {
            self.requester_pending = false;
            if let Role::Connecting(request) = &self.role {
                self.effects
                    .push(Effect::Requester(ConnectOutcome::Failed(ConnectFailure {
                        remote: request.remote,
                        cause: cause.clone(),
                    })));
            }
        }
        self.phase = Phase::ShuttingDown;
        self.effects.push(Effect::Stop(Termination::Failed(cause)));
    }

    fn flush(&mut self) {
        self.effects.extend(self.outbox.drain().map(|effect| match effect {
            SideEffect::Transport(command) => Effect::Transport(command),
            SideEffect::Upstream(command) => Effect::Upstream(command),
            SideEffect::Downstream(signal) => Effect::Downstream(signal),
        }));
    }
}

fn fault_cause(event: TransportEvent) -> FlowError {
    match event {
        TransportEvent::ErrorClosed(cause) => FlowError::ErrorClosed { cause },
        TransportEvent::CommandFailed(command) => FlowError::CommandFailed {
            command: command.name(),
        },
        TransportEvent::Aborted => FlowError::Aborted,
        other => FlowError::protocol(format!("{other:?} is not a transport fault")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DownstreamSignal, UpstreamCommand};
    use bytes::Bytes;
    use tracing_test::traced_test;

    fn running() -> Connection<()> {
        let mut connection = Connection::accepting(7, &FlowConfig::default());
        let effects = connection.handle(ConnectionEvent::Exposed(()));
        assert_eq!(
            effects,
            vec![
                Effect::Transport(TransportCommand::Register),
                Effect::Transport(TransportCommand::ResumeReading),
            ]
        );
        connection
    }

    #[test]
    fn accepting_handoff_starts_both_directions() {
        let connection = running();
        assert_eq!(connection.phase(), Phase::Running);
        assert!(connection.sides().transport_output.demand_available());
    }

    #[test]
    fn chunk_waits_for_downstream_demand() {
        let mut connection = running();
        let effects =
            connection.handle(ConnectionEvent::Transport(TransportEvent::Received(
                Bytes::from_static(b"hi"),
            )));
        assert!(effects.is_empty());
        let effects = connection.handle(ConnectionEvent::Downstream(DownstreamEvent::Request(1)));
        assert_eq!(
            effects,
            vec![
                Effect::Transport(TransportCommand::ResumeReading),
                Effect::Downstream(DownstreamSignal::Next(Bytes::from_static(b"hi"))),
            ]
        );
    }

    #[test]
    fn upstream_subscription_requests_buffer_capacity() {
        let mut connection = running();
        let effects = connection.handle(ConnectionEvent::Upstream(UpstreamEvent::OnSubscribe));
        assert_eq!(effects, vec![Effect::Upstream(UpstreamCommand::Request(16))]);
    }

    #[traced_test]
    #[test]
    fn aborted_transport_fails_once() {
        let mut connection = running();
        let effects = connection.handle(ConnectionEvent::Transport(TransportEvent::Aborted));
        assert_eq!(
            effects,
            vec![
                Effect::Transport(TransportCommand::Abort),
                Effect::Downstream(DownstreamSignal::Error(FlowError::Aborted)),
                Effect::Stop(Termination::Failed(FlowError::Aborted)),
            ]
        );
        assert!(connection.is_terminated());
        assert!(
            connection
                .handle(ConnectionEvent::Transport(TransportEvent::Aborted))
                .is_empty()
        );
        assert!(logs_contain("connection failed"));
    }
}
