#![doc = r#"
# skylink-transport-tcp

## 设计动机（Why）
- **定位**：在专用 Reactor 线程上实现遥测链路的 TCP 介质，提供主动建连的客户端与
  带客户端注册表的监听服务端。
- **架构角色**：实现 `skylink-transport` 中的 [`LinkInterface`] 契约，上层通过
  [`open_url`] 或直接构造 [`TcpClient`]/[`TcpServer`] 获得链路。
- **设计理念**：调用方线程只做入队与查询，所有套接字 IO 都在 Reactor 上完成；
  关闭路径可从任意线程（包括 Reactor 自身）安全触发。

## 核心契约（What）
- **发送**：非阻塞，队列满返回 `QueueOverflow`，链路未打开返回 `ChannelClosed`；
- **写出**：每个缓冲按字节顺序完整写出，支持部分写；缓冲之间 FIFO；
- **接收**：每次读取至多 `rx_buffer_size` 字节并交给解码器，完整消息逐条回调；
- **关闭**：幂等，关闭回调恰好一次；服务端关闭会级联关闭全部已接受的连接。

## 实现策略（How）
- **执行框架**：每个 Reactor 是一条 OS 线程上的 Tokio `current_thread` 运行时；
  读写循环通过 `tokio::select!` 与关闭信号组合；
- **套接字控制**：`socket2` 负责 `SO_REUSEADDR` 与跨线程半关闭句柄；
- **观测**：全部诊断通过 `tracing` 输出，字段统一携带 `conn`/`server` 编号。

## 风险与考量（Trade-offs）
- **线程模型**：每个客户端独占一条线程，适合链路数量有限的机载/地面站场景；
- **回调执行位置**：消息与关闭回调运行在 Reactor 线程上，耗时操作会拖慢该链路 IO。
"#]
#![deny(unsafe_code)]

mod client;
mod config;
mod error;
mod reactor;
mod server;
mod socket;

pub use client::TcpClient;
pub use config::{
    DEFAULT_LISTEN_BACKLOG, DEFAULT_RX_BUFFER_SIZE, DEFAULT_TX_QUEUE_CAPACITY, TcpLinkConfig,
};
pub use server::TcpServer;

use skylink_transport::{FrameDecoder, LinkError, LinkIdentity, LinkInterface, LinkRole, LinkUrl};

/// 按 URL 打开一条 TCP 链路。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 宿主配置里通常只保存一串 URL，本函数把它映射为客户端或服务端，
///   调用方统一持有 trait 对象。
///
/// ## 契约（What）
/// - `tcp://host[:port]` 打开 [`TcpClient`]，`tcp-l://host[:port]` 打开 [`TcpServer`]，
///   端口缺省为 [`skylink_transport::DEFAULT_TCP_PORT`]；
/// - URL 中的 `?ids=sys,comp` 覆盖传入的 `identity`；
/// - `decoder_factory` 对客户端调用一次，对服务端则每接受一个连接调用一次；
/// - 返回的链路尚未启动，需要调用 [`LinkInterface::start`]。
pub fn open_url<D, F>(
    url: &str,
    identity: LinkIdentity,
    config: TcpLinkConfig,
    decoder_factory: F,
) -> Result<Box<dyn LinkInterface<Frame = D::Frame>>, LinkError>
where
    D: FrameDecoder,
    F: Fn() -> D + Send + Sync + 'static,
{
    let url = LinkUrl::parse(url)?;
    let identity = url.identity.unwrap_or(identity);
    match url.role {
        LinkRole::TcpClient => {
            let client = TcpClient::connect(&url.host, url.port, identity, config, decoder_factory())?;
            Ok(Box::new(client))
        }
        LinkRole::TcpServer => {
            let server = TcpServer::listen(&url.host, url.port, identity, config, decoder_factory)?;
            Ok(Box::new(server))
        }
    }
}
