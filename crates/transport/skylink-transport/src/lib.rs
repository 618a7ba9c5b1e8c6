#![deny(unsafe_code)]
#![doc = "skylink-transport: 遥测链路传输层的统一契约。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：为 TCP/串口/UDP 等链路实现提供共同语言，上层在切换介质时无需改动调用方。"]
#![doc = "- **What**：定义 `LinkInterface`、有界发送队列、解析/IO 统计、解码器边界与链路 URL，并提供 `Endpoint` 与同步解析。"]
#![doc = "- **How**：本 crate 不做任何 IO 调度；具体介质实现（如 `skylink-transport-tcp`）负责驱动套接字与 Reactor 线程。"]

pub mod addr;
pub mod error;
pub mod framing;
pub mod link;
pub mod queue;
pub mod state;
pub mod stats;
pub mod url;

pub use addr::{Endpoint, resolve};
pub use error::LinkError;
pub use framing::{FrameDecoder, PassthroughDecoder};
pub use link::{ClosedHandler, LinkId, LinkIdentity, LinkInterface, MessageHandler};
pub use queue::{OutboundBuffer, OutboundQueue};
pub use state::ConnectionState;
pub use stats::{FramingStatus, IoCounters, IoStat};
pub use url::{DEFAULT_TCP_PORT, LinkRole, LinkUrl};
