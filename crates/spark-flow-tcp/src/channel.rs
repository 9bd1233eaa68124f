use crate::{
    config::BridgeConfig,
    error::{CONFIGURE, READ, SHUTDOWN, WRITE, close_cause, map_io_error},
};
use bytes::{Bytes, BytesMut};
use socket2::{SockRef, Socket};
use spark_flow::{FlowError, TransportCommand, TransportEvent};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Notify, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace};

/// 写任务的操作队列元素。
#[derive(Debug)]
enum WriterOp {
    Write(Bytes),
    Shutdown { confirmed: bool },
}

#[derive(Debug, Default)]
struct HalfCloseState {
    local_confirmed: bool,
    peer_eof: bool,
}

/// 读、写两个任务共享的半关闭记录，决定谁来上报 `ConfirmedClosed`。
#[derive(Debug, Default)]
struct HalfClose {
    state: Mutex<HalfCloseState>,
}

impl HalfClose {
    fn lock(&self) -> MutexGuard<'_, HalfCloseState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 读到 EOF：本端已确认关闭则整体关闭完成，否则只是对端半关闭。
    fn on_peer_eof(&self) -> TransportEvent {
        let mut state = self.lock();
        state.peer_eof = true;
        if state.local_confirmed {
            TransportEvent::ConfirmedClosed
        } else {
            TransportEvent::PeerClosed
        }
    }

    /// 本端写方向已关闭；对端早已 EOF 时由写任务上报完成。
    fn on_local_confirmed(&self) -> Option<TransportEvent> {
        let mut state = self.lock();
        state.local_confirmed = true;
        state.peer_eof.then_some(TransportEvent::ConfirmedClosed)
    }
}

/// 单条 TCP 连接的传输层实现：把 [`TransportCommand`] 落地为套接字操作，并把结果以
/// [`TransportEvent`] 回报给连接驱动。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 连接状态机只认“拉取式读取 + 写确认”的传输语义，本结构负责在 Tokio 上复刻它：
///   每个 `ResumeReading` 允许读任务读取一次，每个 `Write` 完整写出后回送一次 `WriteAck`；
/// - 读写拆分为两个任务，互不阻塞，实现真正的全双工。
///
/// ## 逻辑 (How)
/// - 读许可用 [`Notify`] 表达：`notify_one` 在无人等待时至多保存一个许可，恰好对应
///   “同一时刻最多一次未完成读取”；
/// - 写操作经无界队列交给写任务顺序执行；队列长度受状态机的单次未确认写入约束；
/// - `Abort` 通过预先复制的套接字句柄把 `SO_LINGER` 置 0，再终止读任务并让写任务放弃写半部
///   而不发送 FIN，套接字关闭时内核发送 RST。
///
/// ## 契约 (What)
/// - `open` 成功后两个任务已启动，事件写入调用方提供的发送端；
/// - 丢弃通道会终止读任务，写任务在排空已入队的写入与关闭后自行退出。
///
/// ## 注意事项 (Trade-offs)
/// - 对端长期不读时写任务会阻塞在 `write_all` 上，直到连接被中止或对端恢复读取。
#[derive(Debug)]
pub(crate) struct TcpChannel {
    writer_ops: mpsc::UnboundedSender<WriterOp>,
    read_permits: Arc<Notify>,
    events: mpsc::UnboundedSender<TransportEvent>,
    abort_handle: Option<Socket>,
    abort_writer: Option<oneshot::Sender<()>>,
    reader: JoinHandle<()>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl TcpChannel {
    /// 配置套接字并启动读写任务。
    pub(crate) fn open(
        stream: TcpStream,
        config: &BridgeConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, FlowError> {
        config
            .apply(&stream)
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        let abort_handle = SockRef::from(&stream)
            .try_clone()
            .map_err(|err| map_io_error(CONFIGURE, err))?;

        let (read_half, write_half) = stream.into_split();
        let read_permits = Arc::new(Notify::new());
        let half_close = Arc::new(HalfClose::default());
        let (writer_ops, ops) = mpsc::unbounded_channel();
        let (abort_writer, aborted) = oneshot::channel();

        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&read_permits),
            Arc::clone(&half_close),
            events.clone(),
            config.read_chunk_size(),
        ));
        tokio::spawn(write_loop(
            write_half,
            ops,
            half_close,
            events.clone(),
            aborted,
        ));

        debug!(%local_addr, %peer_addr, "tcp channel opened");
        Ok(Self {
            writer_ops,
            read_permits,
            events,
            abort_handle: Some(abort_handle),
            abort_writer: Some(abort_writer),
            reader,
            local_addr,
            peer_addr,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 执行一条传输命令；无法投递时回报 `CommandFailed`。
    pub(crate) fn execute(&mut self, command: TransportCommand) {
        trace!(command = command.name(), peer = %self.peer_addr, "transport command");
        let delivered = match &command {
            TransportCommand::Register => true,
            TransportCommand::ResumeReading => {
                self.read_permits.notify_one();
                true
            }
            TransportCommand::Write(data) => self.enqueue(WriterOp::Write(data.clone())),
            TransportCommand::ConfirmedClose => self.enqueue(WriterOp::Shutdown { confirmed: true }),
            TransportCommand::Close => self.enqueue(WriterOp::Shutdown { confirmed: false }),
            TransportCommand::Abort => {
                self.abort();
                true
            }
            TransportCommand::Connect(_) => false,
        };
        if !delivered {
            debug!(command = command.name(), "transport command rejected");
            let _ = self.events.send(TransportEvent::CommandFailed(command));
        }
    }

    fn enqueue(&self, op: WriterOp) -> bool {
        self.writer_ops.send(op).is_ok()
    }

    fn abort(&mut self) {
        if let Some(socket) = self.abort_handle.take() {
            if let Err(err) = socket.set_linger(Some(Duration::ZERO)) {
                debug!(error = %err, "failed to zero SO_LINGER before abort");
            }
        }
        if let Some(abort_writer) = self.abort_writer.take() {
            let _ = abort_writer.send(());
        }
        self.reader.abort();
        debug!(peer = %self.peer_addr, "tcp channel aborted");
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    permits: Arc<Notify>,
    half_close: Arc<HalfClose>,
    events: mpsc::UnboundedSender<TransportEvent>,
    chunk_size: usize,
) {
    loop {
        permits.notified().await;
        let mut chunk = BytesMut::zeroed(chunk_size);
        match reader.read(&mut chunk).await {
            Ok(0) => {
                let event = half_close.on_peer_eof();
                trace!(?event, "tcp read reached eof");
                let _ = events.send(event);
                return;
            }
            Ok(read) => {
                chunk.truncate(read);
                if events
                    .send(TransportEvent::Received(chunk.freeze()))
                    .is_err()
                {
                    return;
                }
            }
            Err(err) => {
                let _ = events.send(TransportEvent::ErrorClosed(close_cause(READ, &err)));
                return;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut ops: mpsc::UnboundedReceiver<WriterOp>,
    half_close: Arc<HalfClose>,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut aborted: oneshot::Receiver<()>,
) {
    let abort = tokio::select! {
        biased;
        Ok(()) = &mut aborted => true,
        () = drain(&mut writer, &mut ops, &half_close, &events) => false,
    };
    if abort {
        // 不发送 FIN，读半部释放后套接字以 RST 关闭。
        writer.forget();
    }
}

async fn drain(
    writer: &mut OwnedWriteHalf,
    ops: &mut mpsc::UnboundedReceiver<WriterOp>,
    half_close: &HalfClose,
    events: &mpsc::UnboundedSender<TransportEvent>,
) {
    while let Some(op) = ops.recv().await {
        match op {
            WriterOp::Write(data) => {
                if let Err(err) = writer.write_all(&data).await {
                    let _ = events.send(TransportEvent::ErrorClosed(close_cause(WRITE, &err)));
                    return;
                }
                if events.send(TransportEvent::WriteAck).is_err() {
                    return;
                }
            }
            WriterOp::Shutdown { confirmed } => {
                if let Err(err) = writer.shutdown().await {
                    let _ = events.send(TransportEvent::ErrorClosed(close_cause(SHUTDOWN, &err)));
                    return;
                }
                let event = if confirmed {
                    half_close.on_local_confirmed()
                } else {
                    Some(TransportEvent::Closed)
                };
                if let Some(event) = event {
                    let _ = events.send(event);
                }
                return;
            }
        }
    }
}
