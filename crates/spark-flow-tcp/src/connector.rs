use crate::{
    config::BridgeConfig,
    driver::{Driver, next_connection_id},
    endpoint::{BridgeEndpoint, wire},
};
use spark_flow::{ConnectOutcome, ConnectRequest, FlowError, Termination};
use std::net::SocketAddr;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::debug;

/// 一条主动建立的出站连接。
#[derive(Debug)]
pub struct OutgoingConnection {
    pub id: u64,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub endpoint: BridgeEndpoint,
    pub task: JoinHandle<Termination>,
}

/// 连接到 `remote`，建连成功后返回已连线的端点。
///
/// - 端点随握手交给驱动，建连成功后才返还给调用方，因此建连期间应用无法提交元素；
///   状态机本身允许连接方在建连期间缓冲上游元素，只是本驱动不会提前暴露端点；
/// - 失败时返回状态机转交的原因，例如 `spark.flow.transport.connect_failed`
///   或 `spark.flow.transport.connect_timeout`。
pub async fn connect(
    remote: SocketAddr,
    config: &BridgeConfig,
) -> Result<OutgoingConnection, FlowError> {
    config.validate()?;
    let id = next_connection_id();
    let request = ConnectRequest::new(remote).with_timeout(config.connect_timeout());
    let (endpoint, wiring) = wire(config.flow().input_buffer_size());
    let (requester, outcome) = oneshot::channel();
    let task = Driver::connecting(id, request, config.clone(), wiring, requester).spawn(endpoint);

    match outcome.await {
        Ok(ConnectOutcome::Connected {
            remote,
            local,
            endpoint,
        }) => {
            debug!(id, %remote, %local, "outgoing connection established");
            Ok(OutgoingConnection {
                id,
                remote_addr: remote,
                local_addr: local,
                endpoint,
                task,
            })
        }
        Ok(ConnectOutcome::Failed(failure)) => {
            let _ = task.await;
            Err(failure.cause)
        }
        Err(_) => match task.await {
            Ok(Termination::Failed(cause)) => Err(cause),
            _ => Err(FlowError::Cancelled),
        },
    }
}
