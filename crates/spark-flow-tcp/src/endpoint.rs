//! 内部生产/消费端点：应用代码通过它们与一条桥接连接交换字节。
//!
//! ## 角色定位（Why）
//! - 连接状态机以“请求 n 个 / 提交一个”的需求协议与内部两端对话；本模块把该协议包装成
//!   普通的异步 API，应用无需感知状态机；
//! - [`FlowSink`] 是写入方向的生产者，[`FlowSource`] 是读取方向的消费者，
//!   二者合称 [`BridgeEndpoint`]，对应握手消息携带的“已连线端点”。
//!
//! ## 契约（What）
//! - `FlowSink::send` 只在持有需求额度时提交元素，额度由连接的 `Request(n)` 发放；
//! - `FlowSource` 在没有未满足需求时自动申请 `prefetch` 个元素，也可以手动 [`FlowSource::request`]；
//! - 丢弃 `FlowSink` 等同于正常结束，丢弃 `FlowSource` 等同于取消。

use bytes::Bytes;
use futures::Stream;
use spark_flow::{DownstreamEvent, DownstreamSignal, FlowError, UpstreamEvent};
use std::{
    future::poll_fn,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::{Semaphore, mpsc};

/// 写入方向的生产者。
#[derive(Debug)]
pub struct FlowSink {
    events: mpsc::UnboundedSender<UpstreamEvent>,
    credits: Arc<Semaphore>,
    finished: bool,
}

impl FlowSink {
    fn new(events: mpsc::UnboundedSender<UpstreamEvent>, credits: Arc<Semaphore>) -> Self {
        let _ = events.send(UpstreamEvent::OnSubscribe);
        Self {
            events,
            credits,
            finished: false,
        }
    }

    /// 等待一个需求额度后提交元素。
    ///
    /// 连接取消订阅或已经终止时返回 [`FlowError::Cancelled`]。
    pub async fn send(&mut self, data: Bytes) -> Result<(), FlowError> {
        let permit = self
            .credits
            .acquire()
            .await
            .map_err(|_| FlowError::Cancelled)?;
        permit.forget();
        self.events
            .send(UpstreamEvent::OnNext(data))
            .map_err(|_| FlowError::Cancelled)
    }

    /// 当前可立即提交的元素数。
    pub fn available_credit(&self) -> usize {
        self.credits.available_permits()
    }

    /// 正常结束写入方向，连接会在写完已提交数据后关闭写端。
    pub fn complete(mut self) {
        self.finish(UpstreamEvent::OnComplete);
    }

    /// 以错误结束，连接随之失败。
    pub fn fail(mut self, cause: impl Into<String>) {
        self.finish(UpstreamEvent::OnError(cause.into()));
    }

    fn finish(&mut self, event: UpstreamEvent) {
        if !self.finished {
            self.finished = true;
            let _ = self.events.send(event);
        }
    }
}

impl Drop for FlowSink {
    fn drop(&mut self) {
        self.finish(UpstreamEvent::OnComplete);
    }
}

/// 读取方向的消费者。
#[derive(Debug)]
pub struct FlowSource {
    events: mpsc::UnboundedSender<DownstreamEvent>,
    signals: mpsc::UnboundedReceiver<DownstreamSignal>,
    prefetch: u64,
    outstanding: u64,
    done: bool,
}

impl FlowSource {
    /// 追加 `n` 个元素的需求；`n == 0` 会被连接视为协议违例。
    pub fn request(&mut self, n: u64) {
        if self.done {
            return;
        }
        self.outstanding = self.outstanding.saturating_add(n);
        let _ = self.events.send(DownstreamEvent::Request(n));
    }

    /// 取消读取；连接继续运行，但之后读到的数据被丢弃。
    pub fn cancel(&mut self) {
        if !self.done {
            self.done = true;
            let _ = self.events.send(DownstreamEvent::Cancel);
        }
    }

    /// 接收下一个字节块；读取方向结束后返回 `None`。
    pub async fn recv(&mut self) -> Option<Result<Bytes, FlowError>> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, FlowError>>> {
        if self.done {
            return Poll::Ready(None);
        }
        if self.outstanding == 0 {
            self.request(self.prefetch);
        }
        match self.signals.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(DownstreamSignal::Next(data))) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                Poll::Ready(Some(Ok(data)))
            }
            Poll::Ready(Some(DownstreamSignal::Error(cause))) => {
                self.done = true;
                Poll::Ready(Some(Err(cause)))
            }
            Poll::Ready(Some(DownstreamSignal::Complete)) | Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl Stream for FlowSource {
    type Item = Result<Bytes, FlowError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

impl Drop for FlowSource {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 一条连接的内部两端。
#[derive(Debug)]
pub struct BridgeEndpoint {
    pub sink: FlowSink,
    pub source: FlowSource,
}

impl BridgeEndpoint {
    pub fn into_parts(self) -> (FlowSink, FlowSource) {
        (self.sink, self.source)
    }
}

/// 驱动持有的另一半连线。
#[derive(Debug)]
pub(crate) struct Wiring {
    pub(crate) upstream: mpsc::UnboundedReceiver<UpstreamEvent>,
    pub(crate) credits: Arc<Semaphore>,
    pub(crate) downstream: mpsc::UnboundedReceiver<DownstreamEvent>,
    pub(crate) signals: mpsc::UnboundedSender<DownstreamSignal>,
}

/// 创建一对相互连线的端点与驱动侧接线。
pub(crate) fn wire(prefetch: usize) -> (BridgeEndpoint, Wiring) {
    let (upstream_tx, upstream) = mpsc::unbounded_channel();
    let (downstream_tx, downstream) = mpsc::unbounded_channel();
    let (signals, signals_rx) = mpsc::unbounded_channel();
    let credits = Arc::new(Semaphore::new(0));

    let endpoint = BridgeEndpoint {
        sink: FlowSink::new(upstream_tx, Arc::clone(&credits)),
        source: FlowSource {
            events: downstream_tx,
            signals: signals_rx,
            prefetch: u64::try_from(prefetch.max(1)).unwrap_or(u64::MAX),
            outstanding: 0,
            done: false,
        },
    };
    let wiring = Wiring {
        upstream,
        credits,
        downstream,
        signals,
    };
    (endpoint, wiring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn sink_waits_for_credit() {
        let (endpoint, mut wiring) = wire(4);
        let (mut sink, _source) = endpoint.into_parts();
        assert_eq!(wiring.upstream.recv().await, Some(UpstreamEvent::OnSubscribe));

        let blocked = timeout(Duration::from_millis(20), sink.send(Bytes::from_static(b"a"))).await;
        assert!(blocked.is_err(), "send must wait for demand");

        wiring.credits.add_permits(1);
        sink.send(Bytes::from_static(b"a")).await.expect("credited send");
        assert_eq!(
            wiring.upstream.recv().await,
            Some(UpstreamEvent::OnNext(Bytes::from_static(b"a")))
        );
        assert_eq!(sink.available_credit(), 0);

        wiring.credits.close();
        let err = sink
            .send(Bytes::from_static(b"b"))
            .await
            .expect_err("cancelled subscription");
        assert_eq!(err, FlowError::Cancelled);

        drop(sink);
        assert_eq!(wiring.upstream.recv().await, Some(UpstreamEvent::OnComplete));
    }

    #[tokio::test]
    async fn source_prefetches_and_ends_on_complete() {
        let (endpoint, mut wiring) = wire(3);
        let (_sink, mut source) = endpoint.into_parts();

        wiring
            .signals
            .send(DownstreamSignal::Next(Bytes::from_static(b"x")))
            .expect("signal");
        wiring.signals.send(DownstreamSignal::Complete).expect("signal");

        let first = source.recv().await.expect("element").expect("ok");
        assert_eq!(first, Bytes::from_static(b"x"));
        assert_eq!(wiring.downstream.recv().await, Some(DownstreamEvent::Request(3)));
        assert!(source.recv().await.is_none());

        drop(source);
        assert!(
            wiring.downstream.try_recv().is_err(),
            "finished source does not cancel"
        );
    }

    #[tokio::test]
    async fn dropping_source_cancels() {
        let (endpoint, mut wiring) = wire(1);
        let (_sink, source) = endpoint.into_parts();
        drop(source);
        assert_eq!(wiring.downstream.recv().await, Some(DownstreamEvent::Cancel));
    }
}
