use serde::Deserialize;
use skylink_transport::LinkError;

/// 发送队列默认上限（缓冲条数）。
pub const DEFAULT_TX_QUEUE_CAPACITY: usize = 1000;
/// 单次读取的默认缓冲大小。
pub const DEFAULT_RX_BUFFER_SIZE: usize = 2048;
/// 监听队列默认长度。
pub const DEFAULT_LISTEN_BACKLOG: u32 = 128;

/// TCP 链路的可调参数。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把队列上限、读缓冲大小、`TCP_NODELAY` 等介质相关选项集中在一个值对象里，
///   客户端与服务端共用，已接受的客户端继承服务端的配置；
/// - 派生 `serde::Deserialize` 且每个字段都有默认值，宿主可以直接从 TOML/JSON 片段加载。
///
/// ## 契约（What）
/// - `tx_queue_capacity`：每条连接最多排队的缓冲数，必须大于 0；
/// - `rx_buffer_size`：每次读取的最大字节数，必须大于 0；
/// - `nodelay`：是否关闭 Nagle 算法；
/// - `listen_backlog`：服务端 `listen` 的队列长度；
/// - `thread_name_prefix`：Reactor 线程名前缀，客户端为 `<prefix><id>`，服务端为 `<prefix>s<id>`。
///
/// ## 注意事项（Trade-offs）
/// - 配置在构造时被复制进连接，之后的修改不会影响已存在的链路。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpLinkConfig {
    tx_queue_capacity: usize,
    rx_buffer_size: usize,
    nodelay: bool,
    listen_backlog: u32,
    thread_name_prefix: String,
}

impl TcpLinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tx_queue_capacity(mut self, capacity: usize) -> Self {
        self.tx_queue_capacity = capacity;
        self
    }

    pub fn with_rx_buffer_size(mut self, size: usize) -> Self {
        self.rx_buffer_size = size;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_listen_backlog(mut self, backlog: u32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn tx_queue_capacity(&self) -> usize {
        self.tx_queue_capacity
    }

    pub fn rx_buffer_size(&self) -> usize {
        self.rx_buffer_size
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    pub fn listen_backlog(&self) -> u32 {
        self.listen_backlog
    }

    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }

    /// 校验取值范围，构造链路前调用。
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.tx_queue_capacity == 0 {
            return Err(LinkError::InvalidConfig {
                field: "tx_queue_capacity",
                reason: "must be greater than zero",
            });
        }
        if self.rx_buffer_size == 0 {
            return Err(LinkError::InvalidConfig {
                field: "rx_buffer_size",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        Self {
            tx_queue_capacity: DEFAULT_TX_QUEUE_CAPACITY,
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            nodelay: true,
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            thread_name_prefix: "skylink-tcp".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_section_keeps_defaults() {
        let config: TcpLinkConfig = toml::from_str(
            r#"
            tx_queue_capacity = 16
            nodelay = false
            "#,
        )
        .expect("解析配置失败");

        assert_eq!(config.tx_queue_capacity(), 16);
        assert!(!config.nodelay());
        assert_eq!(config.rx_buffer_size(), DEFAULT_RX_BUFFER_SIZE);
        assert_eq!(config.thread_name_prefix(), "skylink-tcp");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<TcpLinkConfig, _> = toml::from_str("tx_queue = 3");
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let err = TcpLinkConfig::new()
            .with_tx_queue_capacity(0)
            .validate()
            .expect_err("零容量应被拒绝");
        assert!(matches!(
            err,
            LinkError::InvalidConfig {
                field: "tx_queue_capacity",
                ..
            }
        ));
        assert!(TcpLinkConfig::default().validate().is_ok());
    }
}
