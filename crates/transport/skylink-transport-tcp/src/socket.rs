//! 基于 `socket2` 的套接字辅助函数。
//!
//! 标准库与 Tokio 均未暴露“先设置 `SO_REUSEADDR` 再绑定”以及跨线程半关闭所需的句柄，
//! 这里统一下沉到 `socket2`。

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use skylink_transport::Endpoint;
use socket2::{Domain, Protocol, SockRef, Socket, Type};

use crate::config::TcpLinkConfig;

/// 阻塞式建连，并按配置设置 `TCP_NODELAY`。
pub(crate) fn connect(endpoint: Endpoint, config: &TcpLinkConfig) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(SocketAddr::from(endpoint))?;
    stream.set_nodelay(config.nodelay())?;
    Ok(stream)
}

/// open → `SO_REUSEADDR` → bind → listen，返回非阻塞监听套接字。
pub(crate) fn listen(endpoint: Endpoint, config: &TcpLinkConfig) -> io::Result<TcpListener> {
    let addr = SocketAddr::from(endpoint);
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    let backlog = i32::try_from(config.listen_backlog()).unwrap_or(i32::MAX);
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// 复制一个只用于关闭控制的套接字句柄，调用方线程可在 Reactor 之外执行半关闭。
#[cfg(unix)]
pub(crate) fn control_handle<S: std::os::fd::AsFd>(stream: &S) -> io::Result<Socket> {
    SockRef::from(stream).try_clone()
}

#[cfg(windows)]
pub(crate) fn control_handle<S: std::os::windows::io::AsSocket>(stream: &S) -> io::Result<Socket> {
    SockRef::from(stream).try_clone()
}

/// 关闭发送方向；对端已断开时的 `NotConnected` 视为成功。
pub(crate) fn shutdown_send(socket: &Socket) -> io::Result<()> {
    match socket.shutdown(Shutdown::Write) {
        Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}
