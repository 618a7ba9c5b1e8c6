use skylink_transport::{Endpoint, LinkError};
use std::io;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "skylink.transport.tcp.accept_failed",
    message: "tcp accept",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "skylink.transport.tcp.read_failed",
    message: "tcp receive",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "skylink.transport.tcp.write_failed",
    message: "tcp send",
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "skylink.transport.tcp.shutdown_failed",
    message: "tcp shutdown",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "skylink.transport.tcp.configure_failed",
    message: "tcp configure",
};

/// 将运行期 IO 错误包装为 [`LinkError::Socket`]。
pub(crate) fn socket_error(kind: OperationKind, source: io::Error) -> LinkError {
    LinkError::Socket {
        operation: kind.message,
        source,
    }
}

pub(crate) fn connect_error(endpoint: Endpoint, source: io::Error) -> LinkError {
    LinkError::Connect { endpoint, source }
}

pub(crate) fn bind_error(endpoint: Endpoint, source: io::Error) -> LinkError {
    LinkError::Bind { endpoint, source }
}

/// 对端有序关闭连接（读到 EOF）。
pub(crate) fn is_peer_eof(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::UnexpectedEof
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_error_keeps_operation_text() {
        let err = socket_error(WRITE, io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.to_string().starts_with("tcp send: "));
        assert_eq!(err.code(), "skylink.transport.socket_error");
    }
}
