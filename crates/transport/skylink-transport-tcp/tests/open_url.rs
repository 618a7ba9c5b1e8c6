//! `open_url` 集成测试：URL 到客户端/服务端的映射与身份覆盖。

mod support;

use skylink_transport::{LinkError, LinkIdentity, LinkInterface, PassthroughDecoder};
use skylink_transport_tcp::{TcpLinkConfig, TcpServer, open_url};
use support::*;

#[test]
fn client_url_connects_and_takes_ids_from_query() {
    let server = TcpServer::listen(
        "127.0.0.1",
        0,
        identity(),
        TcpLinkConfig::default(),
        PassthroughDecoder::new,
    )
    .expect("服务端绑定失败");
    let (handler, frames) = forward_messages();
    server
        .start(handler, Box::new(|| {}))
        .expect("启动服务端失败");
    let port = server.bind_endpoint().port();

    let link = open_url(
        &format!("tcp://127.0.0.1:{port}?ids=7,8"),
        identity(),
        TcpLinkConfig::default(),
        PassthroughDecoder::new,
    )
    .expect("按 URL 打开客户端失败");
    assert_eq!(link.identity(), LinkIdentity::new(7, 8));
    link.start(ignore_messages(), Box::new(|| {}))
        .expect("启动客户端失败");

    link.send_bytes(b"via-url").expect("发送失败");
    assert_eq!(collect_bytes(&frames, 7), b"via-url");
    link.close();
    assert!(!link.is_open());
}

#[test]
fn server_url_binds_and_keeps_given_identity() {
    let link = open_url(
        "tcp-l://127.0.0.1:0",
        identity(),
        TcpLinkConfig::default(),
        PassthroughDecoder::new,
    )
    .expect("按 URL 打开服务端失败");
    assert!(link.is_open());
    assert_eq!(link.identity(), identity());
}

#[test]
fn unknown_scheme_is_rejected() {
    let result = open_url(
        "udp://127.0.0.1:14550",
        identity(),
        TcpLinkConfig::default(),
        PassthroughDecoder::new,
    );
    assert!(matches!(result, Err(LinkError::InvalidUrl { .. })));
}
