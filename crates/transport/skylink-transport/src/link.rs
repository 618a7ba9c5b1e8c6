use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::error::LinkError;
use crate::stats::{FramingStatus, IoStat};

/// 每条完整解码消息的回调，在 Reactor 线程上调用。
pub type MessageHandler<F> = Arc<dyn Fn(F) + Send + Sync>;

/// 链路关闭回调，保证恰好调用一次。
pub type ClosedHandler = Box<dyn FnOnce() + Send>;

/// 本端在遥测网络中的身份。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LinkIdentity {
    pub system_id: u8,
    pub component_id: u8,
}

impl LinkIdentity {
    pub const fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }
}

/// 进程内唯一、单调递增的链路编号，用于日志与线程命名。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(usize);

impl LinkId {
    /// 分配下一个编号。
    pub fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 所有链路变体共享的连接接口契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - TCP、串口、UDP 等实现共享同一组生命周期、发送与查询方法，
///   上层可持有 `Box<dyn LinkInterface<Frame = _>>` 而不关心具体介质；
/// - 客户端与服务端（广播到全部已接受客户端）同样实现该 trait。
///
/// ## 契约说明（What）
/// - `start`：安装回调并启动 Reactor，至多调用一次，否则返回 [`LinkError::AlreadyStarted`]；
/// - `send_bytes`/`send_message`：非阻塞，要么入队，要么立即以
///   [`LinkError::QueueOverflow`] 或 [`LinkError::ChannelClosed`] 拒绝；
/// - `close`：幂等；除在 Reactor 线程内调用外，返回时 IO 循环已完全静止；
///   关闭回调恰好执行一次；
/// - `status`/`io_stat`：返回统计快照，服务端为所有存活客户端之和。
///
/// ## 风险提示（Trade-offs）
/// - 运行期套接字错误不会以返回值形式出现，只能通过关闭回调与统计观测；
/// - 回调在 Reactor 线程上执行，耗时操作会直接拖慢该连接的 IO。
pub trait LinkInterface: Send + Sync {
    /// 解码器产出的消息类型。
    type Frame: Send + 'static;

    /// 链路编号。
    fn id(&self) -> LinkId;

    /// 本端身份。
    fn identity(&self) -> LinkIdentity;

    /// 安装回调并启动 Reactor。
    fn start(
        &self,
        on_message: MessageHandler<Self::Frame>,
        on_closed: ClosedHandler,
    ) -> Result<(), LinkError>;

    /// 关闭链路。
    fn close(&self);

    /// 是否处于 `Open` 状态。
    fn is_open(&self) -> bool;

    /// 复制并发送一段原始字节。
    fn send_bytes(&self, bytes: &[u8]) -> Result<(), LinkError>;

    /// 发送一条已编码的消息。
    fn send_message(&self, message: Bytes) -> Result<(), LinkError>;

    /// 解析统计快照。
    fn status(&self) -> FramingStatus;

    /// 字节级 IO 统计快照。
    fn io_stat(&self) -> IoStat;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_ids_are_unique_and_increasing() {
        let a = LinkId::next();
        let b = LinkId::next();
        assert!(b > a);
        assert!(b.get() > a.get());
        assert_eq!(a.to_string(), a.get().to_string());
    }
}
