#![doc = r#"
# spark-flow-tcp

## 设计动机（Why）
- **定位**：把 `spark-flow` 的纯状态机落地到 Tokio 的 TCP 套接字上，
  让应用以“带需求额度的字节流”读写一条连接。
- **架构角色**：状态机不做 IO，本 crate 负责三件事：执行传输命令、
  把套接字结果回报为传输事件、把应用端点的信号转交给状态机。

## 核心契约（What）
- **入站**：[`TcpBridgeListener::accept`] 返回 [`BridgeConnection`]，端点立即可用；
- **出站**：[`connect`] 在建连成功后返回 [`OutgoingConnection`]，失败返回 [`FlowError`]；
- **背压**：读取方向只在应用申请需求后读取套接字，写入方向只在上一次写入确认后
  才提交下一批数据，内存占用受 [`FlowConfig`](spark_flow::FlowConfig) 的缓冲上限约束。

## 实现策略（How）
- **读写拆分**：每条连接一个驱动任务，另有读、写两个 IO 任务；
  读任务由 `ResumeReading` 逐次放行，写任务按队列顺序写出并回送确认；
- **端点**：[`FlowSink`] 用信号量表达需求额度，[`FlowSource`] 实现 `futures::Stream`。

## 风险与考量（Trade-offs）
- **中止语义**：`Abort` 通过 `SO_LINGER = 0` 让内核发送 RST，未写出的数据会被丢弃；
- **建连**：未配置超时时，建连耗时完全取决于内核的重试策略。
"#]

mod channel;
mod config;
mod connector;
mod driver;
mod endpoint;
mod error;
mod listener;
mod util;

pub use config::{BridgeConfig, DEFAULT_READ_CHUNK_SIZE};
pub use connector::{OutgoingConnection, connect};
pub use endpoint::{BridgeEndpoint, FlowSink, FlowSource};
pub use listener::{BridgeConnection, TcpBridgeListener};
pub use spark_flow::{FlowError, Termination};
