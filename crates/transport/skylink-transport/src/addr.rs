use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6, ToSocketAddrs};

use tracing::{debug, warn};

use crate::error::LinkError;

/// `Endpoint` 描述链路一端已解析的网络地址与端口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - **统一抽象**：客户端的服务器地址、服务端的绑定地址与已接受客户端的对端地址共用同一结构；
/// - **不可变性**：解析完成后不再改变，由解析它的连接或监听器独占持有。
///
/// ## 合同（What）
/// - `V4` 与 `V6` 分别表示 IPv4/IPv6，端口号使用主机序 `u16`；
/// - `Display` 输出与 `std::net::SocketAddr` 一致，适合日志字段；
/// - **后置条件**：与 `SocketAddr` 之间的互转是无损的。
///
/// ## 设计权衡与风险（Trade-offs）
/// - IPv6 保留 `scope_id`，链路本地地址（`fe80::…%if`）解析后仍可建连；`flowinfo` 不被保留。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 {
        addr: [u16; 8],
        port: u16,
        scope_id: u32,
    },
}

impl Endpoint {
    /// 返回端口号。
    pub fn port(&self) -> u16 {
        match self {
            Endpoint::V4 { port, .. } | Endpoint::V6 { port, .. } => *port,
        }
    }

    /// 返回 IP 地址部分。
    pub fn ip(&self) -> IpAddr {
        match self {
            Endpoint::V4 { addr, .. } => IpAddr::V4(Ipv4Addr::from(*addr)),
            Endpoint::V6 { addr, .. } => IpAddr::V6(Ipv6Addr::from(*addr)),
        }
    }

    /// 以新的端口号复制当前地址。
    pub fn with_port(self, port: u16) -> Self {
        match self {
            Endpoint::V4 { addr, .. } => Endpoint::V4 { addr, port },
            Endpoint::V6 { addr, scope_id, .. } => Endpoint::V6 {
                addr,
                port,
                scope_id,
            },
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::from(*self).fmt(f)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => Self::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
                scope_id: v6.scope_id(),
            },
        }
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::V4 { addr, port } => SocketAddr::new(IpAddr::V4(Ipv4Addr::from(addr)), port),
            Endpoint::V6 {
                addr,
                port,
                scope_id,
            } => SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(addr), port, 0, scope_id)),
        }
    }
}

/// 同步解析 `host:port`，返回单个具体端点。
///
/// # 逻辑解析（How）
/// 1. 通过 `ToSocketAddrs` 执行一次阻塞解析；
/// 2. 优先选择第一个 IPv4 结果，否则退回第一个结果；
/// 3. 解析失败或结果为空时返回 [`LinkError::Resolve`]。
///
/// # 合同
/// - **前置条件**：`host` 可以是主机名或字面 IP；
/// - **后置条件**：返回的端点端口总是等于 `port`。
pub fn resolve(host: &str, port: u16) -> Result<Endpoint, LinkError> {
    let candidates: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(iter) => iter.collect(),
        Err(source) => {
            warn!(%host, port, error = %source, "resolve error");
            return Err(LinkError::Resolve {
                host: host.to_owned(),
                port,
                source: Some(source),
            });
        }
    };

    let chosen = candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| LinkError::Resolve {
            host: host.to_owned(),
            port,
            source: None,
        })?;

    let endpoint = Endpoint::from(chosen).with_port(port);
    debug!(%host, %endpoint, "host resolved");
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_ipv4_resolves_without_lookup() {
        let endpoint = resolve("127.0.0.1", 5760).expect("解析字面地址失败");
        assert_eq!(endpoint, Endpoint::V4 { addr: [127, 0, 0, 1], port: 5760 });
        assert_eq!(endpoint.to_string(), "127.0.0.1:5760");
    }

    #[test]
    fn ipv6_round_trips_through_socket_addr() {
        let addr: SocketAddr = "[::1]:14550".parse().expect("parse addr");
        let endpoint = Endpoint::from(addr);
        assert_eq!(endpoint.port(), 14550);
        assert_eq!(SocketAddr::from(endpoint), addr);
    }

    #[test]
    fn link_local_scope_survives_port_override() {
        let addr = SocketAddrV6::new("fe80::1".parse().expect("parse ip"), 14550, 0, 3);
        let endpoint = Endpoint::from(SocketAddr::V6(addr)).with_port(5760);
        match SocketAddr::from(endpoint) {
            SocketAddr::V6(v6) => {
                assert_eq!(v6.scope_id(), 3);
                assert_eq!(v6.port(), 5760);
            }
            other => panic!("unexpected address: {other}"),
        }
        assert_eq!(endpoint.to_string(), "[fe80::1%3]:5760");
    }

    #[test]
    fn unresolvable_host_is_reported() {
        let err = resolve("skylink-does-not-exist.invalid", 5760).expect_err("不应解析成功");
        assert!(matches!(err, LinkError::Resolve { port: 5760, .. }));
    }
}
