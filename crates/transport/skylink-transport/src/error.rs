//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为所有链路变体（TCP、串口、UDP）提供同一套错误语义，上层只需匹配一个枚举；
//! - 区分“构造期致命错误”“发送期可恢复错误”“运行期套接字错误”三类，与回调契约对齐。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，并通过 `#[source]` 保留底层 `io::Error`；
//! - 每个变体提供稳定错误码 [`LinkError::code`]，便于日志与告警聚合。

use std::io;

use thiserror::Error;

use crate::addr::Endpoint;

/// 链路层统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：构造失败需要同步、致命地暴露给调用方；发送失败需要立即拒绝且不破坏队列；
///   运行期套接字错误只会出现在 Reactor 线程上，只能通过关闭回调与日志观测。
/// - **契约 (What)**：
///   - `Resolve`/`Connect`/`Bind`：构造期错误，对象不可用；
///   - `QueueOverflow`/`ChannelClosed`：发送期错误，[`LinkError::is_recoverable`] 返回 `true`；
///   - `Socket`：运行期错误，仅用于日志，不会从 `send_*` 返回；
///   - 其余变体描述生命周期误用或配置问题。
/// - **设计权衡 (Trade-offs)**：`host`/`url` 使用 `String` 保存上下文，换取更好的可读性。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    /// 主机名无法解析为任何可用地址。
    #[error("resolve `{host}:{port}` failed")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: Option<io::Error>,
    },

    /// 阻塞式建连失败。
    #[error("connect to {endpoint} failed")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// 监听套接字的 open/bind/listen 任一步骤失败。
    #[error("bind {endpoint} failed")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// 发送队列已满，本次负载被拒绝，队列内容保持不变。
    #[error("tx queue overflow ({capacity} buffers pending)")]
    QueueOverflow { capacity: usize },

    /// 链路不处于 `Open` 状态，消息不会被静默丢弃。
    #[error("channel closed")]
    ChannelClosed,

    /// `start` 只能调用一次。
    #[error("link already started")]
    AlreadyStarted,

    /// 无法创建 Reactor 线程或其运行时。
    #[error("reactor start failed")]
    Reactor {
        #[source]
        source: io::Error,
    },

    /// Reactor 线程上的读写或关闭失败。
    #[error("{operation}: {source}")]
    Socket {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// 链路 URL 无法识别。
    #[error("invalid link url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    /// 配置字段取值非法。
    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
}

impl LinkError {
    /// 返回稳定的错误码。
    pub fn code(&self) -> &'static str {
        match self {
            LinkError::Resolve { .. } => "skylink.transport.resolve_failed",
            LinkError::Connect { .. } => "skylink.transport.connect_failed",
            LinkError::Bind { .. } => "skylink.transport.bind_failed",
            LinkError::QueueOverflow { .. } => "skylink.transport.queue_overflow",
            LinkError::ChannelClosed => "skylink.transport.channel_closed",
            LinkError::AlreadyStarted => "skylink.transport.already_started",
            LinkError::Reactor { .. } => "skylink.transport.reactor_failed",
            LinkError::Socket { .. } => "skylink.transport.socket_error",
            LinkError::InvalidUrl { .. } => "skylink.transport.invalid_url",
            LinkError::InvalidConfig { .. } => "skylink.transport.invalid_config",
        }
    }

    /// 判断调用方是否可以通过退避或重新打开链路来恢复。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinkError::QueueOverflow { .. } | LinkError::ChannelClosed
        )
    }
}
