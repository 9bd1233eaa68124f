use crate::{
    channel::TcpChannel,
    config::BridgeConfig,
    endpoint::Wiring,
    util::open_stream,
};
use spark_flow::{
    ConnectFailure, ConnectOutcome, ConnectRequest, Connection, ConnectionEvent, Effect, Termination,
    TransportCommand, TransportEvent, UpstreamCommand,
};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{Instrument, debug, info_span};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// 单条连接的事件循环：把套接字、内部端点与状态机串起来。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - [`Connection`] 是纯状态机，不做任何 IO；驱动负责把三路输入（传输事件、上游信号、
///   下游信号）逐条喂给它，并按顺序执行返回的效果；
/// - 每条连接一个 Tokio 任务，连接间互不共享状态。
///
/// ## 逻辑 (How)
/// - 先投递握手消息，再进入 `select!` 循环；
/// - 效果在同一轮内执行完毕，`Connect` 的结果作为下一条事件排入本地队列，
///   保证状态机看到的事件顺序与效果顺序一致；
/// - 收到 `Stop` 后退出循环，关闭上游额度使阻塞中的生产者立即返回。
///
/// ## 契约 (What)
/// - `run` 的返回值即连接的终止方式，且恰好产生一次；
/// - 连接方角色的结果经 `requester` 送回发起方，发送失败（发起方已放弃）被忽略。
pub(crate) struct Driver<E> {
    connection: Connection<E>,
    config: BridgeConfig,
    channel: Option<TcpChannel>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    wiring: Wiring,
    requester: Option<oneshot::Sender<ConnectOutcome<E>>>,
}

impl Driver<()> {
    /// 已接受的连接：套接字在创建驱动前就已建立。
    pub(crate) fn accepting(
        id: u64,
        config: BridgeConfig,
        channel: TcpChannel,
        transport: (
            mpsc::UnboundedSender<TransportEvent>,
            mpsc::UnboundedReceiver<TransportEvent>,
        ),
        wiring: Wiring,
    ) -> Self {
        let (transport_tx, transport_rx) = transport;
        Self {
            connection: Connection::accepting(id, config.flow()),
            config,
            channel: Some(channel),
            transport_tx,
            transport_rx,
            wiring,
            requester: None,
        }
    }
}

impl<E: Send + 'static> Driver<E> {
    /// 主动建连：套接字由 `Connect` 效果打开。
    pub(crate) fn connecting(
        id: u64,
        request: ConnectRequest,
        config: BridgeConfig,
        wiring: Wiring,
        requester: oneshot::Sender<ConnectOutcome<E>>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        Self {
            connection: Connection::connecting(id, request, config.flow()),
            config,
            channel: None,
            transport_tx,
            transport_rx,
            wiring,
            requester: Some(requester),
        }
    }

    /// 在独立任务中运行驱动。
    pub(crate) fn spawn(self, handoff: E) -> JoinHandle<Termination> {
        let span = info_span!("flow_connection", connection = self.connection.id());
        tokio::spawn(self.run(handoff).instrument(span))
    }

    async fn run(mut self, handoff: E) -> Termination {
        let mut next = Some(ConnectionEvent::Exposed(handoff));
        let termination = loop {
            if let Some(event) = next.take() {
                if let Some(termination) = self.dispatch(event).await {
                    break termination;
                }
            }
            // 驱动自身持有 `transport_tx`，传输事件分支永不关闭；循环只在 `Stop` 时结束。
            next = Some(tokio::select! {
                Some(event) = self.transport_rx.recv() => ConnectionEvent::Transport(event),
                Some(event) = self.wiring.upstream.recv() => ConnectionEvent::Upstream(event),
                Some(event) = self.wiring.downstream.recv() => ConnectionEvent::Downstream(event),
            });
        };
        self.wiring.credits.close();
        match &termination {
            Termination::Completed => debug!("driver stopped after completion"),
            Termination::Failed(cause) => debug!(code = cause.code(), %cause, "driver stopped after failure"),
        }
        termination
    }

    async fn dispatch(&mut self, event: ConnectionEvent<E>) -> Option<Termination> {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for effect in self.connection.handle(event) {
                match effect {
                    Effect::Transport(TransportCommand::Connect(request)) => {
                        let outcome = self.connect(request).await;
                        pending.push_back(ConnectionEvent::Transport(outcome));
                    }
                    Effect::Transport(command) => self.execute(command),
                    Effect::Upstream(UpstreamCommand::Request(n)) => {
                        self.wiring.credits.add_permits(n);
                    }
                    Effect::Upstream(UpstreamCommand::Cancel) => self.wiring.credits.close(),
                    Effect::Downstream(signal) => {
                        let _ = self.wiring.signals.send(signal);
                    }
                    Effect::Requester(outcome) => {
                        if let Some(requester) = self.requester.take() {
                            let _ = requester.send(outcome);
                        }
                    }
                    Effect::Stop(termination) => return Some(termination),
                }
            }
        }
        None
    }

    fn execute(&mut self, command: TransportCommand) {
        match self.channel.as_mut() {
            Some(channel) => channel.execute(command),
            None => {
                let _ = self
                    .transport_tx
                    .send(TransportEvent::CommandFailed(command));
            }
        }
    }

    async fn connect(&mut self, request: ConnectRequest) -> TransportEvent {
        let remote = request.remote;
        debug!(%remote, timeout = ?request.timeout, "opening tcp stream");
        let opened = match open_stream(&request).await {
            Ok(stream) => TcpChannel::open(stream, &self.config, self.transport_tx.clone()),
            Err(cause) => Err(cause),
        };
        match opened {
            Ok(channel) => {
                let event = TransportEvent::Connected {
                    remote: channel.peer_addr(),
                    local: channel.local_addr(),
                };
                self.channel = Some(channel);
                event
            }
            Err(cause) => TransportEvent::ConnectFailed(ConnectFailure { remote, cause }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::wire;
    use std::time::Duration;
    use tokio::{
        io::AsyncReadExt,
        net::{TcpListener, TcpStream},
        time::timeout,
    };

    #[tokio::test]
    async fn released_endpoint_completes_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (mut peer, stream) = (client.expect("connect"), accepted.expect("accept").0);

        let config = BridgeConfig::default();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let channel = TcpChannel::open(stream, &config, transport_tx.clone()).expect("open");
        let (endpoint, wiring) = wire(config.flow().input_buffer_size());
        let task = Driver::accepting(
            next_connection_id(),
            config,
            channel,
            (transport_tx, transport_rx),
            wiring,
        )
        .spawn(());
        drop(endpoint);

        let termination = timeout(Duration::from_secs(5), task)
            .await
            .expect("driver stops in time")
            .expect("driver task");
        assert_eq!(termination, Termination::Completed);

        let mut rest = Vec::new();
        let read = timeout(Duration::from_secs(5), peer.read_to_end(&mut rest))
            .await
            .expect("eof in time")
            .expect("peer read");
        assert_eq!(read, 0);
    }
}
