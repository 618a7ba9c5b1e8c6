//! TCP 服务端：监听、接受连接并维护客户端注册表。

use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use skylink_transport::{
    ClosedHandler, ConnectionState, Endpoint, FrameDecoder, FramingStatus, IoStat, LinkError,
    LinkId, LinkIdentity, LinkInterface, MessageHandler, resolve,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::client::ClientCore;
use crate::config::TcpLinkConfig;
use crate::error;
use crate::reactor::ReactorThread;
use crate::socket;

type DecoderFactory<D> = Arc<dyn Fn() -> D + Send + Sync>;

struct ServerCore<D: FrameDecoder> {
    id: LinkId,
    identity: LinkIdentity,
    bind_endpoint: Endpoint,
    config: TcpLinkConfig,
    decoder_factory: DecoderFactory<D>,
    state: Mutex<ConnectionState>,
    listener: Mutex<Option<StdTcpListener>>,
    /// 锁顺序：注册表 → 客户端内部锁，反向获取是禁止的。
    registry: Mutex<Vec<Arc<ClientCore<D>>>>,
    on_message: OnceLock<MessageHandler<D::Frame>>,
    on_closed: Mutex<Option<ClosedHandler>>,
    closing: watch::Sender<bool>,
    reactor: OnceLock<ReactorThread>,
    destroying: AtomicBool,
}

impl<D: FrameDecoder> ServerCore<D> {
    fn start(
        self: &Arc<Self>,
        on_message: MessageHandler<D::Frame>,
        on_closed: ClosedHandler,
    ) -> Result<(), LinkError> {
        if !self.state.lock().is_open() {
            return Err(LinkError::ChannelClosed);
        }
        let listener = self.listener.lock().take().ok_or(LinkError::AlreadyStarted)?;
        if self.on_message.set(on_message).is_err() {
            return Err(LinkError::AlreadyStarted);
        }
        *self.on_closed.lock() = Some(on_closed);

        let name = format!("{}s{}", self.config.thread_name_prefix(), self.id);
        let core = Arc::clone(self);
        let fault = Arc::clone(self);
        match ReactorThread::spawn(name, move || core.accept_loop(listener), move || fault.close()) {
            Ok(reactor) => {
                let _ = self.reactor.set(reactor);
                Ok(())
            }
            Err(err) => {
                error!(server = %self.id, error = %err, "failed to start reactor");
                self.close();
                Err(err)
            }
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: StdTcpListener) {
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(source) => {
                error!(server = %self.id, code = error::CONFIGURE.code, error = %source, "{}", error::CONFIGURE.message);
                self.close();
                return;
            }
        };
        let mut closing = self.closing.subscribe();

        loop {
            if self.destroying.load(Ordering::Acquire) {
                return;
            }
            let accepted = tokio::select! {
                _ = closing.wait_for(|closing| *closing) => return,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => self.register(stream, Endpoint::from(peer)),
                Err(source) => {
                    error!(server = %self.id, code = error::ACCEPT.code, error = %source, "{}", error::ACCEPT.message);
                    self.close();
                    return;
                }
            }
        }
    }

    /// 为新连接创建内核、接线回调并加入注册表。
    fn register(self: &Arc<Self>, stream: TcpStream, peer: Endpoint) {
        let client = ClientCore::accepted(
            self.identity,
            peer,
            self.config.clone(),
            (self.decoder_factory)(),
        );
        if let Some(handler) = self.on_message.get() {
            client.set_message_handler(Arc::clone(handler));
        }

        let server = Arc::downgrade(self);
        let weak_client = Arc::downgrade(&client);
        client.set_closed_handler(Box::new(move || {
            if let Some(server) = server.upgrade() {
                server.deregister(&weak_client);
            }
        }));

        let mut registry = self.registry.lock();
        match client.on_connected(stream) {
            Ok(()) => {
                info!(server = %self.id, conn = %client.id(), %peer, "got client");
                registry.push(client);
            }
            Err(err) => {
                warn!(server = %self.id, %peer, error = %err, "dropping accepted connection");
            }
        }
    }

    fn deregister(&self, client: &Weak<ClientCore<D>>) {
        let Some(client) = client.upgrade() else {
            return;
        };
        info!(server = %self.id, conn = %client.id(), peer = %client.endpoint(), "client connection closed");
        self.registry.lock().retain(|entry| !Arc::ptr_eq(entry, &client));
    }

    /// 对所有已注册客户端入队同一负载，单个客户端失败只记录告警。
    fn broadcast(&self, payload: Bytes) -> Result<(), LinkError> {
        if self.state.lock().is_closing_or_closed() {
            return Err(LinkError::ChannelClosed);
        }
        let registry = self.registry.lock();
        for client in registry.iter() {
            if let Err(err) = client.enqueue(payload.clone()) {
                warn!(server = %self.id, conn = %client.id(), error = %err, "broadcast to client failed");
            }
        }
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if !state.is_open() {
                return;
            }
            debug_assert!(state.can_transition_to(ConnectionState::Closing));
            *state = ConnectionState::Closing;
        }
        info!(server = %self.id, endpoint = %self.bind_endpoint, "terminating server, all connections will be closed");
        self.closing.send_replace(true);
        self.listener.lock().take();

        // 先停下接受循环，之后注册表不会再增长。
        if let Some(reactor) = self.reactor.get() {
            reactor.stop_and_join();
        }
        let clients = std::mem::take(&mut *self.registry.lock());
        for client in clients {
            client.close();
        }

        {
            let mut state = self.state.lock();
            debug_assert!(state.can_transition_to(ConnectionState::Closed));
            *state = ConnectionState::Closed;
        }
        let on_closed = self.on_closed.lock().take();
        if let Some(on_closed) = on_closed {
            on_closed();
        }
    }

    fn reap(&self) {
        if let Some(reactor) = self.reactor.get() {
            reactor.join();
        }
    }
}

/// 监听指定地址的 TCP 服务端。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 一个监听端口对应多个地面站或机载组件，服务端把它们聚合成一条逻辑链路：
///   发送即广播，统计为所有存活客户端之和；
/// - 已接受的连接共享服务端的 Reactor 线程，不额外占用 OS 线程。
///
/// ## 逻辑（How）
/// - `listen`：解析地址 → `SO_REUSEADDR` → bind → listen，任何一步失败返回 [`LinkError::Bind`]；
/// - `start`：在名为 `<prefix>s<id>` 的线程上循环接受连接；
/// - 每个新连接继承服务端的身份、配置与消息回调，并获得一个新的解码器实例；
/// - 客户端关闭时通过弱引用把自己从注册表移除，服务端已销毁时静默跳过。
///
/// ## 契约（What）
/// - `close`：停止接受、关闭全部已注册客户端，关闭回调恰好执行一次；
/// - `send_*`：服务端关闭后返回 [`LinkError::ChannelClosed`]，否则尽力广播并返回 `Ok(())`；
/// - `status`/`io_stat`：已移除的客户端不再计入。
///
/// ## 注意事项（Trade-offs）
/// - 广播在注册表锁内逐个入队，某个客户端队列满时只影响该客户端。
pub struct TcpServer<D: FrameDecoder> {
    core: Arc<ServerCore<D>>,
}

impl<D: FrameDecoder> TcpServer<D> {
    /// 解析并绑定 `host:port`，`decoder_factory` 为每个接受的连接创建解码器。
    pub fn listen<F>(
        host: &str,
        port: u16,
        identity: LinkIdentity,
        config: TcpLinkConfig,
        decoder_factory: F,
    ) -> Result<Self, LinkError>
    where
        F: Fn() -> D + Send + Sync + 'static,
    {
        config.validate()?;
        let requested = resolve(host, port)?;
        let listener = socket::listen(requested, &config)
            .map_err(|source| error::bind_error(requested, source))?;
        let bind_endpoint = listener
            .local_addr()
            .map(Endpoint::from)
            .map_err(|source| error::bind_error(requested, source))?;

        let core = ServerCore {
            id: LinkId::next(),
            identity,
            bind_endpoint,
            config,
            decoder_factory: Arc::new(decoder_factory),
            state: Mutex::new(ConnectionState::Open),
            listener: Mutex::new(Some(listener)),
            registry: Mutex::new(Vec::new()),
            on_message: OnceLock::new(),
            on_closed: Mutex::new(None),
            closing: watch::Sender::new(false),
            reactor: OnceLock::new(),
            destroying: AtomicBool::new(false),
        };
        info!(server = %core.id, endpoint = %bind_endpoint, "bind address");

        Ok(Self {
            core: Arc::new(core),
        })
    }

    /// 实际绑定的本地地址（端口为 0 时已替换为系统分配的端口）。
    pub fn bind_endpoint(&self) -> Endpoint {
        self.core.bind_endpoint
    }

    /// 当前注册表中的客户端数量。
    pub fn client_count(&self) -> usize {
        self.core.registry.lock().len()
    }

    pub fn state(&self) -> ConnectionState {
        *self.core.state.lock()
    }

    pub fn config(&self) -> &TcpLinkConfig {
        &self.core.config
    }
}

impl<D: FrameDecoder> LinkInterface for TcpServer<D> {
    type Frame = D::Frame;

    fn id(&self) -> LinkId {
        self.core.id
    }

    fn identity(&self) -> LinkIdentity {
        self.core.identity
    }

    fn start(
        &self,
        on_message: MessageHandler<Self::Frame>,
        on_closed: ClosedHandler,
    ) -> Result<(), LinkError> {
        self.core.start(on_message, on_closed)
    }

    fn close(&self) {
        self.core.close();
    }

    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    fn send_bytes(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.core.broadcast(Bytes::copy_from_slice(bytes))
    }

    fn send_message(&self, message: Bytes) -> Result<(), LinkError> {
        self.core.broadcast(message)
    }

    fn status(&self) -> FramingStatus {
        self.core.registry.lock().iter().map(|client| client.status()).sum()
    }

    fn io_stat(&self) -> IoStat {
        self.core.registry.lock().iter().map(|client| client.io_stat()).sum()
    }
}

impl<D: FrameDecoder> Drop for TcpServer<D> {
    fn drop(&mut self) {
        self.core.destroying.store(true, Ordering::Release);
        for client in self.core.registry.lock().iter() {
            client.mark_destroying();
        }
        self.core.close();
        self.core.reap();
    }
}
