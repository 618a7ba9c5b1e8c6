use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// 解码协作方维护的解析统计快照。
///
/// # 契约说明（What）
/// - 四个计数器均单调递增，由外部解码器在解析过程中累加；
/// - 服务端视图通过 [`Sum`] 对注册表中的所有存活客户端求和，不单独持久化。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FramingStatus {
    /// 成功解出的消息数。
    pub parse_success_count: u64,
    /// 因序号跳变等原因判定丢失的消息数。
    pub parse_drop_count: u64,
    /// 解析缓冲溢出次数。
    pub buffer_overrun_count: u64,
    /// 校验失败等解析错误次数。
    pub parse_error_count: u64,
}

impl Add for FramingStatus {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for FramingStatus {
    fn add_assign(&mut self, rhs: Self) {
        self.parse_success_count += rhs.parse_success_count;
        self.parse_drop_count += rhs.parse_drop_count;
        self.buffer_overrun_count += rhs.buffer_overrun_count;
        self.parse_error_count += rhs.parse_error_count;
    }
}

impl Sum for FramingStatus {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// 字节级 IO 统计快照。
///
/// `tx_rate`/`rx_rate` 以字节每秒计，表示距离上一次采样的平均速率。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IoStat {
    pub tx_total_bytes: u64,
    pub tx_rate: f64,
    pub rx_total_bytes: u64,
    pub rx_rate: f64,
}

impl Add for IoStat {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for IoStat {
    fn add_assign(&mut self, rhs: Self) {
        self.tx_total_bytes += rhs.tx_total_bytes;
        self.tx_rate += rhs.tx_rate;
        self.rx_total_bytes += rhs.rx_total_bytes;
        self.rx_rate += rhs.rx_rate;
    }
}

impl Sum for IoStat {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug)]
struct RateSample {
    at: Instant,
    tx_total: u64,
    rx_total: u64,
}

/// 单条链路的字节计数器与速率采样器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - Reactor 线程在每次读写完成后累加计数，调用方线程随时读取快照；
///   计数器使用原子变量，热路径上不加锁。
/// - 速率按“两次 [`IoCounters::snapshot`] 之间的字节增量 / 时间差”计算，
///   与轮询式监控的使用方式一致。
///
/// ## 契约说明（What）
/// - `add_tx`/`add_rx`：由唯一的 IO 线程调用；
/// - `snapshot`：可从任意线程调用，会推进采样窗口；
/// - **后置条件**：`*_total_bytes` 单调不减。
///
/// ## 风险提示（Trade-offs）
/// - 多个观察者交替调用 `snapshot` 时，各自看到的是相邻两次调用之间的速率；
/// - 首次采样的时间基准为计数器创建时刻。
#[derive(Debug)]
pub struct IoCounters {
    tx_total: AtomicU64,
    rx_total: AtomicU64,
    last: Mutex<RateSample>,
}

impl IoCounters {
    pub fn new() -> Self {
        Self {
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            last: Mutex::new(RateSample {
                at: Instant::now(),
                tx_total: 0,
                rx_total: 0,
            }),
        }
    }

    /// 记录写出的字节数。
    pub fn add_tx(&self, bytes: usize) {
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// 记录读入的字节数。
    pub fn add_rx(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// 读取累计值并计算自上次采样以来的速率。
    pub fn snapshot(&self) -> IoStat {
        let mut last = self.last.lock();
        let now = Instant::now();
        let tx_total = self.tx_total.load(Ordering::Relaxed);
        let rx_total = self.rx_total.load(Ordering::Relaxed);

        let elapsed = now.duration_since(last.at).as_secs_f64();
        let (tx_rate, rx_rate) = if elapsed > 0.0 {
            (
                (tx_total - last.tx_total) as f64 / elapsed,
                (rx_total - last.rx_total) as f64 / elapsed,
            )
        } else {
            (0.0, 0.0)
        };

        *last = RateSample {
            at: now,
            tx_total,
            rx_total,
        };

        IoStat {
            tx_total_bytes: tx_total,
            tx_rate,
            rx_total_bytes: rx_total,
            rx_rate,
        }
    }
}

impl Default for IoCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn framing_status_sums_fieldwise() {
        let a = FramingStatus {
            parse_success_count: 3,
            parse_drop_count: 1,
            buffer_overrun_count: 0,
            parse_error_count: 2,
        };
        let b = FramingStatus {
            parse_success_count: 4,
            ..FramingStatus::default()
        };
        let total: FramingStatus = [a, b].into_iter().sum();
        assert_eq!(total.parse_success_count, 7);
        assert_eq!(total.parse_drop_count, 1);
        assert_eq!(total.parse_error_count, 2);
    }

    #[test]
    fn snapshot_reports_totals_and_positive_rate() {
        let counters = IoCounters::new();
        thread::sleep(Duration::from_millis(5));
        counters.add_tx(1000);
        counters.add_rx(10);
        counters.add_rx(15);

        let stat = counters.snapshot();
        assert_eq!(stat.tx_total_bytes, 1000);
        assert_eq!(stat.rx_total_bytes, 25);
        assert!(stat.tx_rate > 0.0);

        thread::sleep(Duration::from_millis(5));
        let idle = counters.snapshot();
        assert_eq!(idle.tx_total_bytes, 1000);
        assert_eq!(idle.tx_rate, 0.0);
    }
}
