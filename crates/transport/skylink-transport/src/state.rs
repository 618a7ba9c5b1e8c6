use std::fmt;

/// 连接生命周期状态。
///
/// # 合同（What）
/// - `Created -> Open`：套接字建立成功（客户端建连或服务端接受）；
/// - `Open -> Closing`：首次关闭触发（显式调用、套接字错误或所有者销毁）；
/// - `Closing -> Closed`：Reactor 已停止或保证会停止；
/// - 关闭是幂等的：`Closing`/`Closed` 上的再次关闭请求不产生任何效果。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Created,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    /// 是否已进入关闭流程（`Closing` 或 `Closed`）。
    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, ConnectionState::Closing | ConnectionState::Closed)
    }

    /// 判断到 `next` 的迁移是否合法。
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Created, Open) | (Open, Closing) | (Closing, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Created => "created",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
