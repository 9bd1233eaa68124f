use crate::{
    channel::TcpChannel,
    config::BridgeConfig,
    driver::{Driver, next_connection_id},
    endpoint::{BridgeEndpoint, wire},
    error::{ACCEPT, BIND, map_io_error},
};
use spark_flow::{FlowError, Termination};
use std::net::SocketAddr;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tracing::debug;

/// 一条已接受并开始泵送的入站连接。
#[derive(Debug)]
pub struct BridgeConnection {
    /// 进程内唯一的连接编号，同时出现在日志 span 中。
    pub id: u64,
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    /// 应用侧读写端点。
    pub endpoint: BridgeEndpoint,
    /// 驱动任务，结束时给出终止方式。
    pub task: JoinHandle<Termination>,
}

/// 监听 TCP 端口，并为每个入站连接启动一个桥接驱动。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接受方角色的握手在本地即可完成：套接字已建立，端点已连线，驱动启动时立即投递握手；
/// - 监听器只负责“接受 → 配置 → 启动”，连接的生命周期由各自的驱动任务管理。
///
/// ## 契约 (What)
/// - `bind` 会先校验配置，非法配置不会占用端口；
/// - `accept` 返回时驱动任务已在运行，读取方向在应用请求数据前不会读取套接字。
///
/// ## 注意事项 (Trade-offs)
/// - 单次 `accept` 失败（如文件描述符耗尽）只返回错误，不会关闭监听器，是否重试由调用方决定。
#[derive(Debug)]
pub struct TcpBridgeListener {
    inner: TcpListener,
    local_addr: SocketAddr,
    config: BridgeConfig,
}

impl TcpBridgeListener {
    /// 绑定到指定地址。
    pub async fn bind(addr: SocketAddr, config: BridgeConfig) -> Result<Self, FlowError> {
        config.validate()?;
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|err| map_io_error(BIND, err))?;
        let local_addr = inner.local_addr().map_err(|err| map_io_error(BIND, err))?;
        debug!(%local_addr, "bridge listener bound");
        Ok(Self {
            inner,
            local_addr,
            config,
        })
    }

    /// 实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// 接受一个入站连接并启动其驱动。
    pub async fn accept(&self) -> Result<BridgeConnection, FlowError> {
        let (stream, _) = self
            .inner
            .accept()
            .await
            .map_err(|err| map_io_error(ACCEPT, err))?;
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let channel = TcpChannel::open(stream, &self.config, transport_tx.clone())?;
        let (local_addr, peer_addr) = (channel.local_addr(), channel.peer_addr());

        let id = next_connection_id();
        let (endpoint, wiring) = wire(self.config.flow().input_buffer_size());
        let driver = Driver::accepting(
            id,
            self.config.clone(),
            channel,
            (transport_tx, transport_rx),
            wiring,
        );
        debug!(id, %peer_addr, "accepted connection");
        Ok(BridgeConnection {
            id,
            local_addr,
            peer_addr,
            endpoint,
            task: driver.spawn(()),
        })
    }
}
