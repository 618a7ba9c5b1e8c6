//! 链路 URL 解析。
//!
//! 支持的形式：
//! - `tcp://host[:port]`：主动连接的客户端，默认 `localhost:5760`；
//! - `tcp-l://host[:port]`：监听的服务端，默认 `0.0.0.0:5760`；
//! - 可选查询串 `?ids=<system_id>,<component_id>` 覆盖本端身份。

use std::fmt;
use std::str::FromStr;

use crate::error::LinkError;
use crate::link::LinkIdentity;

/// TCP 链路的默认端口。
pub const DEFAULT_TCP_PORT: u16 = 5760;

const DEFAULT_CLIENT_HOST: &str = "localhost";
const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// 链路角色。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkRole {
    /// `tcp://`
    TcpClient,
    /// `tcp-l://`
    TcpServer,
}

/// 解析后的链路 URL。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkUrl {
    pub role: LinkRole,
    pub host: String,
    pub port: u16,
    pub identity: Option<LinkIdentity>,
}

impl LinkUrl {
    pub fn parse(url: &str) -> Result<Self, LinkError> {
        let invalid = |reason| LinkError::InvalidUrl {
            url: url.to_owned(),
            reason,
        };

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let (role, default_host) = match scheme {
            "tcp" => (LinkRole::TcpClient, DEFAULT_CLIENT_HOST),
            "tcp-l" => (LinkRole::TcpServer, DEFAULT_SERVER_HOST),
            _ => return Err(invalid("unsupported scheme")),
        };

        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };
        let authority = authority.trim_end_matches('/');

        let (host, port) = split_host_port(authority).ok_or_else(|| invalid("bad port"))?;
        let host = if host.is_empty() { default_host } else { host };
        let port = port.unwrap_or(DEFAULT_TCP_PORT);

        let identity = match query {
            Some(query) => parse_ids(query).map_err(invalid)?,
            None => None,
        };

        Ok(Self {
            role,
            host: host.to_owned(),
            port,
            identity,
        })
    }
}

impl FromStr for LinkUrl {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LinkUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.role {
            LinkRole::TcpClient => "tcp",
            LinkRole::TcpServer => "tcp-l",
        };
        if self.host.contains(':') {
            write!(f, "{scheme}://[{}]:{}", self.host, self.port)?;
        } else {
            write!(f, "{scheme}://{}:{}", self.host, self.port)?;
        }
        if let Some(ids) = self.identity {
            write!(f, "?ids={},{}", ids.system_id, ids.component_id)?;
        }
        Ok(())
    }
}

/// 拆分 `host[:port]`，支持 `[v6]:port`；端口非法时返回 `None`。
fn split_host_port(authority: &str) -> Option<(&str, Option<u16>)> {
    if let Some(stripped) = authority.strip_prefix('[') {
        let (host, tail) = stripped.split_once(']')?;
        return match tail.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if tail.is_empty() => Some((host, None)),
            None => None,
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => Some((host, Some(port.parse().ok()?))),
        None => Some((authority, None)),
    }
}

fn parse_ids(query: &str) -> Result<Option<LinkIdentity>, &'static str> {
    for pair in query.split('&') {
        let Some(value) = pair.strip_prefix("ids=") else {
            continue;
        };
        let (sys, comp) = value.split_once(',').ok_or("ids needs two values")?;
        let system_id = sys.trim().parse().map_err(|_| "bad system id")?;
        let component_id = comp.trim().parse().map_err(|_| "bad component id")?;
        return Ok(Some(LinkIdentity::new(system_id, component_id)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_url_with_explicit_port() {
        let url = LinkUrl::parse("tcp://192.168.1.20:5770").expect("解析失败");
        assert_eq!(url.role, LinkRole::TcpClient);
        assert_eq!(url.host, "192.168.1.20");
        assert_eq!(url.port, 5770);
        assert_eq!(url.identity, None);
    }

    #[test]
    fn server_url_falls_back_to_defaults() {
        let url: LinkUrl = "tcp-l://".parse().expect("解析失败");
        assert_eq!(url.role, LinkRole::TcpServer);
        assert_eq!(url.host, "0.0.0.0");
        assert_eq!(url.port, DEFAULT_TCP_PORT);
    }

    #[test]
    fn ids_query_overrides_identity() {
        let url = LinkUrl::parse("tcp://[::1]:5761/?ids=1,240").expect("解析失败");
        assert_eq!(url.host, "::1");
        assert_eq!(url.port, 5761);
        assert_eq!(url.identity, Some(LinkIdentity::new(1, 240)));
        assert_eq!(url.to_string(), "tcp://[::1]:5761?ids=1,240");
    }

    #[test]
    fn unknown_scheme_and_bad_port_are_rejected() {
        assert!(matches!(
            LinkUrl::parse("serial:///dev/ttyACM0"),
            Err(LinkError::InvalidUrl { reason: "unsupported scheme", .. })
        ));
        assert!(matches!(
            LinkUrl::parse("tcp://localhost:99999"),
            Err(LinkError::InvalidUrl { reason: "bad port", .. })
        ));
    }
}
