use crate::error::{CONNECT, map_io_error};
use spark_flow::{ConnectRequest, FlowError};
use std::{future::Future, io, net::SocketAddr, time::Duration};
use tokio::{net::TcpStream, time::timeout};

/// 按请求发起 TCP 建连，超时与失败都归一为连接层错误。
///
/// - 失败原因保留 `tcp connect` 操作的稳定文案，便于日志检索；
/// - `timeout` 为 `None` 时完全交给内核的 SYN 重试策略。
pub(crate) async fn open_stream(request: &ConnectRequest) -> Result<TcpStream, FlowError> {
    run_with_timeout(
        request.remote,
        request.timeout,
        TcpStream::connect(request.remote),
    )
    .await
}

pub(crate) async fn run_with_timeout<T, F>(
    remote: SocketAddr,
    limit: Option<Duration>,
    future: F,
) -> Result<T, FlowError>
where
    F: Future<Output = io::Result<T>>,
{
    let outcome = match limit {
        Some(limit) => timeout(limit, future)
            .await
            .map_err(|_| FlowError::ConnectTimeout { remote })?,
        None => future.await,
    };
    outcome.map_err(|err| FlowError::ConnectFailed {
        remote,
        cause: map_io_error(CONNECT, err).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> SocketAddr {
        "127.0.0.1:9".parse().expect("addr")
    }

    #[tokio::test]
    async fn elapsed_limit_is_a_connect_timeout() {
        let result: Result<(), FlowError> = run_with_timeout(
            remote(),
            Some(Duration::from_millis(10)),
            std::future::pending::<io::Result<()>>(),
        )
        .await;
        assert_eq!(result, Err(FlowError::ConnectTimeout { remote: remote() }));
    }

    #[tokio::test]
    async fn io_failure_keeps_connect_context() {
        let result: Result<(), FlowError> = run_with_timeout(remote(), None, async {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        })
        .await;
        let err = result.expect_err("refused");
        assert_eq!(err.code(), "spark.flow.transport.connect_failed");
        assert!(err.to_string().contains("tcp connect"), "{err}");
    }
}
