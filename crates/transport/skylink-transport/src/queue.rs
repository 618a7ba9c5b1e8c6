//! 有界发送队列与部分写入游标。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 套接字写入可能只接受缓冲的一部分；游标记录已确认写出的字节数，续写只发送剩余部分，
//!   从而保证不重复、不缺失；
//! - 队列容量固定，超出时立即拒绝而非阻塞等待，避免背压下内存无界增长。
//!
//! ## 契约（What）
//! - [`OutboundBuffer`]：不可变负载 + 可变 `position`，满足 `0 <= position <= len`；
//! - [`OutboundQueue`]：严格 FIFO，元素数量永不超过 `capacity`；
//! - 只有当队首缓冲 `position == len` 时才会被移出。
//!
//! ## 注意事项（Trade-offs）
//! - 队列本身不加锁，由持有它的连接在自己的互斥锁内访问；
//! - `front_remaining` 返回 `Bytes` 切片（引用计数克隆），可在释放锁后交给异步写入。

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::LinkError;

/// 一条待发送的字节负载及其发送游标。
#[derive(Clone, Debug)]
pub struct OutboundBuffer {
    payload: Bytes,
    position: usize,
}

impl OutboundBuffer {
    /// 以未发送状态包装负载。
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            position: 0,
        }
    }

    /// 负载总长度。
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// 负载是否为空。
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// 已发送字节数。
    pub fn position(&self) -> usize {
        self.position
    }

    /// 尚未发送的字节数。
    pub fn remaining_len(&self) -> usize {
        self.payload.len() - self.position
    }

    /// 尚未发送的字节视图。
    pub fn remaining(&self) -> Bytes {
        self.payload.slice(self.position..)
    }

    /// 是否已全部发送。
    pub fn is_complete(&self) -> bool {
        self.position == self.payload.len()
    }

    /// 推进游标，返回实际推进的字节数。
    ///
    /// 游标不会越过负载末尾；写入方报告的字节数若超过剩余量，只记入剩余量。
    pub fn advance(&mut self, written: usize) -> usize {
        let step = written.min(self.remaining_len());
        self.position += step;
        step
    }
}

/// 有界 FIFO 发送队列。
#[derive(Debug)]
pub struct OutboundQueue {
    buffers: VecDeque<OutboundBuffer>,
    capacity: usize,
}

impl OutboundQueue {
    /// 创建容量为 `capacity` 的空队列。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: VecDeque::new(),
            capacity,
        }
    }

    /// 队列上限。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前排队的缓冲数量。
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// 是否已达到上限。
    pub fn is_full(&self) -> bool {
        self.buffers.len() >= self.capacity
    }

    /// 入队一条负载；队列已满时返回 [`LinkError::QueueOverflow`]，队列内容不变。
    ///
    /// 空负载不会占用队列位置，直接视为发送成功。
    pub fn push(&mut self, payload: Bytes) -> Result<(), LinkError> {
        if self.is_full() {
            return Err(LinkError::QueueOverflow {
                capacity: self.capacity,
            });
        }
        if payload.is_empty() {
            return Ok(());
        }
        self.buffers.push_back(OutboundBuffer::new(payload));
        Ok(())
    }

    /// 队首缓冲的剩余字节，队列为空时返回 `None`。
    pub fn front_remaining(&self) -> Option<Bytes> {
        self.buffers.front().map(OutboundBuffer::remaining)
    }

    /// 记录队首缓冲写出了 `written` 字节，写满后将其移出。
    ///
    /// 返回 `true` 表示队列仍有待发送数据。
    pub fn advance_front(&mut self, written: usize) -> bool {
        if let Some(front) = self.buffers.front_mut() {
            front.advance(written);
            if front.is_complete() {
                self.buffers.pop_front();
            }
        }
        !self.buffers.is_empty()
    }

    /// 丢弃全部待发送数据，返回被丢弃的缓冲数量。
    pub fn clear(&mut self) -> usize {
        let dropped = self.buffers.len();
        self.buffers.clear();
        dropped
    }
}
