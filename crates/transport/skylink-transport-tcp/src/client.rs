//! TCP 客户端连接。
//!
//! 同一份 [`ClientCore`] 既服务于主动建连的 [`TcpClient`]（独占 Reactor 线程），
//! 也服务于服务端接受的连接（以任务形式运行在服务端的 Reactor 上）。

use std::io;
use std::net::TcpStream as StdTcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use parking_lot::Mutex;
use skylink_transport::{
    ClosedHandler, ConnectionState, Endpoint, FrameDecoder, FramingStatus, IoCounters, IoStat,
    LinkError, LinkId, LinkIdentity, LinkInterface, MessageHandler, OutboundQueue, resolve,
};
use socket2::Socket;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::config::TcpLinkConfig;
use crate::error::{self, OperationKind};
use crate::reactor::ReactorThread;
use crate::socket;

/// 受同一把锁保护的连接状态与发送队列。
///
/// 状态检查与入队必须在同一临界区内完成，否则关闭与发送交错时可能把消息写进已清空的队列。
struct LinkState {
    state: ConnectionState,
    queue: OutboundQueue,
    /// 发送循环正持有队首缓冲；为 `true` 时新的入队无需唤醒。
    tx_in_flight: bool,
}

/// 一条 TCP 连接的共享内核。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 异步读写任务与调用方线程需要同时访问队列、统计与关闭状态，因此内核放在 `Arc` 中，
///   任务捕获强引用，保证回调执行期间对象不会被释放；
/// - 服务端持有已接受连接的强引用，连接的关闭回调只捕获服务端与自身的弱引用，避免环。
///
/// ## 逻辑（How）
/// - 接收：读满至多 `rx_buffer_size` 字节 → 累加统计 → 交给解码器 → 在释放解码器锁后逐条回调；
/// - 发送：取队首剩余切片，单次 `write`，按实际写入量推进游标，写完出队；队列为空时等待 `drain`；
/// - 关闭：在状态锁内切到 `Closing`、清空队列、通过复制的控制句柄半关闭发送方向并广播关闭信号，
///   锁外停止并回收 Reactor（在 Reactor 线程内则跳过），最后置为 `Closed` 并执行一次关闭回调。
///
/// ## 契约（What）
/// - 入队要么成功，要么以 `ChannelClosed`/`QueueOverflow` 拒绝且队列不变；
/// - 同一缓冲的字节严格按序写出，缓冲之间保持 FIFO；
/// - 关闭回调至多执行一次，且不在任何内部锁内执行。
///
/// ## 注意事项（Trade-offs）
/// - 解码器在 Reactor 上串行调用，统计查询只需短暂获取同一把锁；
/// - `destroying` 置位后接收循环不再投递消息，用于句柄析构时抑制迟到回调。
pub(crate) struct ClientCore<D: FrameDecoder> {
    id: LinkId,
    identity: LinkIdentity,
    endpoint: Endpoint,
    config: TcpLinkConfig,
    link: Mutex<LinkState>,
    drain: Notify,
    closing: watch::Sender<bool>,
    control: Mutex<Option<Socket>>,
    pending: Mutex<Option<StdTcpStream>>,
    decoder: Mutex<D>,
    counters: IoCounters,
    on_message: OnceLock<MessageHandler<D::Frame>>,
    on_closed: Mutex<Option<ClosedHandler>>,
    reactor: OnceLock<ReactorThread>,
    destroying: AtomicBool,
}

impl<D: FrameDecoder> ClientCore<D> {
    fn new(
        identity: LinkIdentity,
        endpoint: Endpoint,
        config: TcpLinkConfig,
        decoder: D,
        state: ConnectionState,
    ) -> Self {
        let queue = OutboundQueue::with_capacity(config.tx_queue_capacity());
        Self {
            id: LinkId::next(),
            identity,
            endpoint,
            config,
            link: Mutex::new(LinkState {
                state,
                queue,
                tx_in_flight: false,
            }),
            drain: Notify::new(),
            closing: watch::Sender::new(false),
            control: Mutex::new(None),
            pending: Mutex::new(None),
            decoder: Mutex::new(decoder),
            counters: IoCounters::new(),
            on_message: OnceLock::new(),
            on_closed: Mutex::new(None),
            reactor: OnceLock::new(),
            destroying: AtomicBool::new(false),
        }
    }

    /// 服务端接受的连接：处于 `Created`，由 [`ClientCore::on_connected`] 激活。
    pub(crate) fn accepted(
        identity: LinkIdentity,
        peer: Endpoint,
        config: TcpLinkConfig,
        decoder: D,
    ) -> Arc<Self> {
        Arc::new(Self::new(
            identity,
            peer,
            config,
            decoder,
            ConnectionState::Created,
        ))
    }

    pub(crate) fn id(&self) -> LinkId {
        self.id
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub(crate) fn pending(&self) -> usize {
        self.link.lock().queue.len()
    }

    pub(crate) fn set_message_handler(&self, handler: MessageHandler<D::Frame>) -> bool {
        self.on_message.set(handler).is_ok()
    }

    pub(crate) fn set_closed_handler(&self, handler: ClosedHandler) {
        *self.on_closed.lock() = Some(handler);
    }

    pub(crate) fn mark_destroying(&self) {
        self.destroying.store(true, Ordering::Release);
    }

    /// 服务端接受后的激活钩子，必须在服务端 Reactor 内调用。
    pub(crate) fn on_connected(self: &Arc<Self>, stream: TcpStream) -> Result<(), LinkError> {
        stream
            .set_nodelay(self.config.nodelay())
            .map_err(|source| error::socket_error(error::CONFIGURE, source))?;
        let control = socket::control_handle(&stream)
            .map_err(|source| error::socket_error(error::CONFIGURE, source))?;
        {
            let mut link = self.link.lock();
            if link.state != ConnectionState::Created {
                return Err(LinkError::ChannelClosed);
            }
            *self.control.lock() = Some(control);
            debug_assert!(link.state.can_transition_to(ConnectionState::Open));
            link.state = ConnectionState::Open;
        }
        tokio::spawn(Arc::clone(self).drive(stream));
        Ok(())
    }

    /// 在独占 Reactor 线程上启动已建连的客户端。
    fn start_dedicated(
        self: &Arc<Self>,
        on_message: MessageHandler<D::Frame>,
        on_closed: ClosedHandler,
    ) -> Result<(), LinkError> {
        // 与 `close` 共用链路锁：回调要么在关闭前装好，要么启动被拒绝。
        let stream = {
            let link = self.link.lock();
            if !link.state.is_open() {
                return Err(LinkError::ChannelClosed);
            }
            let stream = self.pending.lock().take().ok_or(LinkError::AlreadyStarted)?;
            if !self.set_message_handler(on_message) {
                return Err(LinkError::AlreadyStarted);
            }
            self.set_closed_handler(on_closed);
            stream
        };

        let name = format!("{}{}", self.config.thread_name_prefix(), self.id);
        let core = Arc::clone(self);
        let fault = Arc::clone(self);
        match ReactorThread::spawn(name, move || core.run_std(stream), move || fault.close()) {
            Ok(reactor) => {
                let _ = self.reactor.set(reactor);
                Ok(())
            }
            Err(err) => {
                error!(conn = %self.id, error = %err, "failed to start reactor");
                self.close();
                Err(err)
            }
        }
    }

    async fn run_std(self: Arc<Self>, stream: StdTcpStream) {
        let stream = match stream
            .set_nonblocking(true)
            .and_then(|()| TcpStream::from_std(stream))
        {
            Ok(stream) => stream,
            Err(source) => {
                self.report(error::CONFIGURE, &source);
                self.close();
                return;
            }
        };
        self.drive(stream).await;
    }

    /// 并发驱动接收与发送循环，直到出错或收到关闭信号。
    async fn drive(self: Arc<Self>, stream: TcpStream) {
        let (mut reader, mut writer) = stream.into_split();
        let mut closing = self.closing.subscribe();

        let failure = tokio::select! {
            _ = closing.wait_for(|closing| *closing) => None,
            result = self.recv_loop(&mut reader) => result.err().map(|err| (error::READ, err)),
            result = self.send_loop(&mut writer) => result.err().map(|err| (error::WRITE, err)),
        };
        drop(reader);
        drop(writer);

        if let Some((kind, source)) = failure {
            self.report(kind, &source);
            self.close();
        }
    }

    async fn recv_loop(&self, reader: &mut OwnedReadHalf) -> io::Result<()> {
        let mut buf = vec![0u8; self.config.rx_buffer_size()];
        let mut frames = Vec::new();
        loop {
            if self.destroying.load(Ordering::Acquire) {
                return Ok(());
            }
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
            self.counters.add_rx(read);
            self.decoder.lock().decode(&buf[..read], &mut frames);

            match self.on_message.get() {
                Some(handler) if !self.destroying.load(Ordering::Acquire) => {
                    for frame in frames.drain(..) {
                        handler(frame);
                    }
                }
                _ => frames.clear(),
            }
        }
    }

    async fn send_loop(&self, writer: &mut OwnedWriteHalf) -> io::Result<()> {
        loop {
            let chunk = {
                let mut link = self.link.lock();
                let chunk = link.queue.front_remaining();
                link.tx_in_flight = chunk.is_some();
                chunk
            };
            let Some(chunk) = chunk else {
                self.drain.notified().await;
                continue;
            };

            let written = writer.write(&chunk).await?;
            if written == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            self.counters.add_tx(written);
            self.link.lock().queue.advance_front(written);
        }
    }

    /// 在状态锁内检查 `Open` 并入队，必要时唤醒发送循环。
    pub(crate) fn enqueue(&self, payload: Bytes) -> Result<(), LinkError> {
        let wake = {
            let mut link = self.link.lock();
            if !link.state.is_open() {
                debug!(conn = %self.id, "send rejected: channel closed");
                return Err(LinkError::ChannelClosed);
            }
            link.queue.push(payload)?;
            !link.tx_in_flight
        };
        // 多次唤醒会合并为一个许可，已在写出时由发送循环自行续写。
        if wake {
            self.drain.notify_one();
        }
        Ok(())
    }

    pub(crate) fn close(&self) {
        {
            let mut link = self.link.lock();
            if !link.state.is_open() {
                return;
            }
            debug_assert!(link.state.can_transition_to(ConnectionState::Closing));
            link.state = ConnectionState::Closing;
            let dropped = link.queue.clear();
            link.tx_in_flight = false;
            if dropped > 0 {
                debug!(conn = %self.id, dropped, "discarding queued buffers on close");
            }

            if let Some(control) = self.control.lock().take() {
                if let Err(err) = socket::shutdown_send(&control) {
                    warn!(conn = %self.id, code = error::SHUTDOWN.code, error = %err, "{}", error::SHUTDOWN.message);
                }
            }
            self.pending.lock().take();
            self.closing.send_replace(true);
        }

        if let Some(reactor) = self.reactor.get() {
            if !reactor.stop_and_join() {
                debug!(conn = %self.id, reactor = reactor.name(), "close requested from reactor thread");
            }
        }

        {
            let mut link = self.link.lock();
            debug_assert!(link.state.can_transition_to(ConnectionState::Closed));
            link.state = ConnectionState::Closed;
        }
        info!(conn = %self.id, peer = %self.endpoint, "connection closed");

        let on_closed = self.on_closed.lock().take();
        if let Some(on_closed) = on_closed {
            on_closed();
        }
    }

    /// 回收已经退出的 Reactor 线程；在 Reactor 线程内调用时直接返回。
    fn reap(&self) {
        if let Some(reactor) = self.reactor.get() {
            reactor.join();
        }
    }

    pub(crate) fn status(&self) -> FramingStatus {
        self.decoder.lock().status()
    }

    pub(crate) fn io_stat(&self) -> IoStat {
        self.counters.snapshot()
    }

    /// 本端已发起关闭时，socket 收到的 EPIPE/ECONNRESET 是关闭本身的后果，只记 debug。
    fn report(&self, kind: OperationKind, source: &io::Error) {
        if self.state().is_closing_or_closed() {
            debug!(
                conn = %self.id,
                peer = %self.endpoint,
                error = %source,
                "{} stopped after local close",
                kind.message
            );
        } else if error::is_peer_eof(source) {
            info!(conn = %self.id, peer = %self.endpoint, "peer closed connection");
        } else {
            error!(
                conn = %self.id,
                peer = %self.endpoint,
                code = kind.code,
                error = %source,
                "{}",
                kind.message
            );
        }
    }
}

/// 主动建连的 TCP 客户端。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 构造即完成解析与阻塞建连，失败同步返回，成功后链路已处于 `Open`；
/// - `start` 之后 IO 全部在名为 `<prefix><id>` 的专用线程上进行，调用方线程只做入队。
///
/// ## 契约（What）
/// - `start` 之前即可 `send_*`，数据会排队，启动后依序写出；
/// - 句柄析构时抑制后续消息回调、执行关闭并回收线程。
///
/// ## 注意事项（Trade-offs）
/// - 解析结果优先取 IPv4 地址，且端口以调用方传入的为准。
pub struct TcpClient<D: FrameDecoder> {
    core: Arc<ClientCore<D>>,
}

impl<D: FrameDecoder> TcpClient<D> {
    /// 解析 `host:port` 并建立连接。
    pub fn connect(
        host: &str,
        port: u16,
        identity: LinkIdentity,
        config: TcpLinkConfig,
        decoder: D,
    ) -> Result<Self, LinkError> {
        config.validate()?;
        let endpoint = resolve(host, port)?;
        let stream = socket::connect(endpoint, &config)
            .map_err(|source| error::connect_error(endpoint, source))?;
        let control = socket::control_handle(&stream)
            .map_err(|source| error::socket_error(error::CONFIGURE, source))?;

        let core = ClientCore::new(identity, endpoint, config, decoder, ConnectionState::Open);
        *core.control.lock() = Some(control);
        *core.pending.lock() = Some(stream);
        info!(conn = %core.id, peer = %endpoint, "connected");

        Ok(Self {
            core: Arc::new(core),
        })
    }

    /// 连接的远端地址。
    pub fn endpoint(&self) -> Endpoint {
        self.core.endpoint()
    }

    /// 尚未完全写出的缓冲数量。
    pub fn pending(&self) -> usize {
        self.core.pending()
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn config(&self) -> &TcpLinkConfig {
        &self.core.config
    }
}

impl<D: FrameDecoder> LinkInterface for TcpClient<D> {
    type Frame = D::Frame;

    fn id(&self) -> LinkId {
        self.core.id()
    }

    fn identity(&self) -> LinkIdentity {
        self.core.identity
    }

    fn start(
        &self,
        on_message: MessageHandler<Self::Frame>,
        on_closed: ClosedHandler,
    ) -> Result<(), LinkError> {
        self.core.start_dedicated(on_message, on_closed)
    }

    fn close(&self) {
        self.core.close();
    }

    fn is_open(&self) -> bool {
        self.core.is_open()
    }

    fn send_bytes(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.core.enqueue(Bytes::copy_from_slice(bytes))
    }

    fn send_message(&self, message: Bytes) -> Result<(), LinkError> {
        self.core.enqueue(message)
    }

    fn status(&self) -> FramingStatus {
        self.core.status()
    }

    fn io_stat(&self) -> IoStat {
        self.core.io_stat()
    }
}

impl<D: FrameDecoder> Drop for TcpClient<D> {
    fn drop(&mut self) {
        self.core.mark_destroying();
        self.core.close();
        self.core.reap();
    }
}
