//! 回环测试的公共夹具。
#![allow(dead_code)]

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use skylink_transport::{ClosedHandler, LinkIdentity, MessageHandler};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn identity() -> LinkIdentity {
    LinkIdentity::new(1, 190)
}

/// 在 `127.0.0.1` 上绑定临时端口，充当对端。
pub fn loopback_peer() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("绑定回环端口失败");
    let port = listener.local_addr().expect("读取本地地址失败").port();
    (listener, port)
}

pub fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().expect("接受连接失败");
    stream
        .set_read_timeout(Some(WAIT))
        .expect("设置读超时失败");
    stream
}

pub fn connect_peer(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("连接服务端失败");
    stream
        .set_read_timeout(Some(WAIT))
        .expect("设置读超时失败");
    stream
}

/// 轮询条件直到成立或超时。
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn ignore_messages() -> MessageHandler<Bytes> {
    Arc::new(|_: Bytes| {})
}

/// 把收到的每条消息转发到通道。
pub fn forward_messages() -> (MessageHandler<Bytes>, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel();
    let handler: MessageHandler<Bytes> = Arc::new(move |frame: Bytes| {
        let _ = tx.send(frame);
    });
    (handler, rx)
}

/// 记录关闭回调的调用次数，并在每次调用时发出通知。
pub fn closed_counter() -> (ClosedHandler, Arc<AtomicUsize>, mpsc::Receiver<()>) {
    let count = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let counter = Arc::clone(&count);
    let handler: ClosedHandler = Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(());
    });
    (handler, count, rx)
}

/// 从消息通道收集字节，直到累计 `len` 字节。
pub fn collect_bytes(rx: &mpsc::Receiver<Bytes>, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let frame = rx.recv_timeout(WAIT).expect("等待消息超时");
        out.extend_from_slice(&frame);
    }
    out
}
