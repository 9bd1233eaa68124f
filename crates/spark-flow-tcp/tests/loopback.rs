//! 回环集成测试：在真实 TCP 套接字上验证桥接的端到端行为。
//!
//! - 回显：客户端写入若干元素后结束，服务端逐块回显并在读到结束后关闭，两端都以
//!   `Completed` 终止，客户端收到的字节与写入顺序一致；
//! - 建连失败：目标端口无人监听时返回 `connect_failed` 错误码；
//! - 上游失败：客户端生产者报错会中止连接，服务端读取方向以错误结束。

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use spark_flow_tcp::{BridgeConfig, FlowError, TcpBridgeListener, Termination, connect};
use std::{net::SocketAddr, time::Duration};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().expect("loopback addr")
}

#[tokio::test]
async fn echo_round_trip_completes_both_sides() {
    init_tracing();
    timeout(TEST_TIMEOUT, async {
        let listener = TcpBridgeListener::bind(loopback(), BridgeConfig::default())
            .await
            .expect("bind");
        let addr = listener.local_addr();

        let server = tokio::spawn(async move {
            let connection = listener.accept().await.expect("accept");
            let (mut sink, mut source) = connection.endpoint.into_parts();
            while let Some(chunk) = source.next().await {
                sink.send(chunk.expect("server read")).await.expect("echo");
            }
            sink.complete();
            connection.task.await.expect("server task")
        });

        let config = BridgeConfig::default().with_connect_timeout(Some(Duration::from_secs(5)));
        let client = connect(addr, &config).await.expect("connect");
        assert_eq!(client.remote_addr, addr);
        let (mut sink, source) = client.endpoint.into_parts();

        let writer = async move {
            for part in ["hello", " ", "bridged", " ", "world"] {
                sink.send(Bytes::from(part)).await.expect("client send");
            }
            sink.complete();
        };
        let reader = source.fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk.expect("client read"));
            acc
        });
        let ((), echoed) = tokio::join!(writer, reader);

        assert_eq!(&echoed[..], b"hello bridged world");
        assert_eq!(client.task.await.expect("client task"), Termination::Completed);
        assert_eq!(server.await.expect("server"), Termination::Completed);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn refused_connection_reports_connect_failed() {
    init_tracing();
    let addr = {
        let vacant = tokio::net::TcpListener::bind(loopback())
            .await
            .expect("vacant bind");
        vacant.local_addr().expect("vacant addr")
    };

    let err = timeout(TEST_TIMEOUT, connect(addr, &BridgeConfig::default()))
        .await
        .expect("test timed out")
        .expect_err("nothing listens on the vacant port");
    assert_eq!(err.code(), "spark.flow.transport.connect_failed");
    assert!(matches!(err, FlowError::ConnectFailed { remote, .. } if remote == addr));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_binding() {
    let config = BridgeConfig::default().with_read_chunk_size(0);
    let err = TcpBridgeListener::bind(loopback(), config)
        .await
        .expect_err("zero chunk size");
    assert_eq!(err.code(), "spark.flow.invalid_config");
}

#[tokio::test]
async fn upstream_failure_aborts_the_connection() {
    init_tracing();
    timeout(TEST_TIMEOUT, async {
        let listener = TcpBridgeListener::bind(loopback(), BridgeConfig::default())
            .await
            .expect("bind");
        let addr = listener.local_addr();
        let (accepted_tx, accepted) = tokio::sync::oneshot::channel();
        let server = tokio::spawn(async move {
            let connection = listener.accept().await.expect("accept");
            let _ = accepted_tx.send(());
            let (_sink, mut source) = connection.endpoint.into_parts();
            let mut outcome = None;
            while let Some(item) = source.next().await {
                if let Err(err) = item {
                    outcome = Some(err);
                }
            }
            (outcome, connection.task.await.expect("server task"))
        });

        let client = connect(addr, &BridgeConfig::default()).await.expect("connect");
        let (sink, _source) = client.endpoint.into_parts();
        accepted.await.expect("server accepted");
        sink.fail("producer broke");

        assert_eq!(
            client.task.await.expect("client task"),
            Termination::Failed(FlowError::UpstreamFailed {
                cause: "producer broke".to_owned()
            })
        );

        let (outcome, termination) = server.await.expect("server");
        let err = outcome.expect("server read ends with an error");
        assert_eq!(err.code(), "spark.flow.transport.error_closed");
        assert!(matches!(termination, Termination::Failed(_)));
    })
    .await
    .expect("test timed out");
}
