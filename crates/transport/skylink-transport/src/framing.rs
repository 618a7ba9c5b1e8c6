//! 外部解码协作方的边界。
//!
//! 链路层只负责搬运字节：每次读成功后以 `(buffer, used_bytes)` 调用解码器，
//! 消息边界恢复与解析统计完全由解码器负责。

use bytes::Bytes;

use crate::stats::FramingStatus;

/// 将原始字节流转换为离散消息的解码器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 帧格式与链路实现解耦：同一 TCP 连接可以承载任意应用协议；
/// - 解码器自身维护解析统计，链路层通过 [`FrameDecoder::status`] 透传给上层。
///
/// ## 契约说明（What）
/// - `decode`：消费 `bytes` 中的全部字节，把解出的完整消息追加到 `out`；
///   不完整的尾部由解码器内部缓存，等待下一次调用；
/// - `status`：返回累计的解析统计；
/// - **前置条件**：同一解码器只会被一个 Reactor 线程串行调用；
/// - **后置条件**：`out` 中消息的顺序与其在字节流中的顺序一致。
pub trait FrameDecoder: Send + 'static {
    /// 解出的消息类型。
    type Frame: Send + 'static;

    /// 解析一次读取得到的字节。
    fn decode(&mut self, bytes: &[u8], out: &mut Vec<Self::Frame>);

    /// 当前解析统计。
    fn status(&self) -> FramingStatus;
}

/// 透传解码器：每次成功读取视为一条消息。
///
/// 适用于上层自行处理分帧，或只关心字节流本身的场景。
#[derive(Debug, Default)]
pub struct PassthroughDecoder {
    status: FramingStatus,
}

impl PassthroughDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for PassthroughDecoder {
    type Frame = Bytes;

    fn decode(&mut self, bytes: &[u8], out: &mut Vec<Bytes>) {
        if bytes.is_empty() {
            return;
        }
        self.status.parse_success_count += 1;
        out.push(Bytes::copy_from_slice(bytes));
    }

    fn status(&self) -> FramingStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_emits_one_frame_per_read() {
        let mut decoder = PassthroughDecoder::new();
        let mut out = Vec::new();
        decoder.decode(b"hello", &mut out);
        decoder.decode(b"", &mut out);
        decoder.decode(b"world", &mut out);

        assert_eq!(out, vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")]);
        assert_eq!(decoder.status().parse_success_count, 2);
    }
}
