//! 专用 Reactor 线程。
//!
//! 每个客户端或服务端独占一条 OS 线程，线程内运行 Tokio `current_thread` 运行时；
//! 服务端接受的客户端以任务形式挂在服务端的运行时上，不单独持有线程。

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use skylink_transport::LinkError;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// 持有 Reactor 线程的停止信号与 `JoinHandle`。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 关闭路径需要“停止事件循环并等待线程退出”，但关闭也可能由 Reactor 线程自身
///   触发（读错误、对端 EOF），此时 `join` 自己会死锁；
/// - 运行期 panic 不能静默吞掉，需要记录日志并走一次关闭流程，保证回调被触发。
///
/// ## 逻辑（How）
/// - 运行时在调用方线程构建，构建失败同步返回 [`LinkError::Reactor`]；
/// - 线程内 `block_on` 同时等待停止信号与业务 future，任一完成即退出；
/// - `catch_unwind` 包住 `block_on`，panic 时记录 `error!` 并调用 `on_fault`；
/// - `is_current` 比较线程 ID，供关闭路径跳过自 `join`。
///
/// ## 契约（What）
/// - `stop` 可在任意线程多次调用；
/// - `stop_and_join` 在 Reactor 线程内调用时只发送信号并返回 `false`；
/// - 句柄被丢弃时停止信号的发送端随之关闭，事件循环同样会退出。
pub(crate) struct ReactorThread {
    name: String,
    stop: watch::Sender<bool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ReactorThread {
    pub(crate) fn spawn<F, Fut, P>(name: String, task: F, on_fault: P) -> Result<Self, LinkError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
        P: FnOnce() + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|source| LinkError::Reactor { source })?;
        let (stop, mut stop_rx) = watch::channel(false);
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    runtime.block_on(async move {
                        tokio::select! {
                            _ = stop_rx.wait_for(|stopped| *stopped) => {}
                            _ = task() => {}
                        }
                    });
                }));
                // 先丢弃运行时，挂在其上的连接任务与套接字随之释放。
                drop(runtime);
                match outcome {
                    Ok(()) => debug!(reactor = %thread_name, "reactor stopped"),
                    Err(payload) => {
                        error!(
                            reactor = %thread_name,
                            panic = panic_message(payload.as_ref()),
                            "reactor terminated by panic"
                        );
                        on_fault();
                    }
                }
            })
            .map_err(|source| LinkError::Reactor { source })?;

        let thread_id = handle.thread().id();
        debug!(reactor = %name, "reactor started");
        Ok(Self {
            name,
            stop,
            thread: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// 当前线程是否就是 Reactor 线程。
    pub(crate) fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub(crate) fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// 等待线程退出；在 Reactor 线程内调用或已回收时直接返回。
    pub(crate) fn join(&self) {
        if self.is_current() {
            return;
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(reactor = %self.name, "reactor thread panicked during shutdown");
            }
        }
    }

    /// 发送停止信号并在可能时回收线程，返回是否完成了 `join`。
    pub(crate) fn stop_and_join(&self) -> bool {
        self.stop();
        if self.is_current() {
            return false;
        }
        self.join();
        true
    }
}

impl Drop for ReactorThread {
    fn drop(&mut self) {
        self.stop();
        // 最后一个引用可能在 Reactor 线程内释放，此时只能分离线程。
        if !self.is_current() {
            if let Some(handle) = self.thread.get_mut().take() {
                let _ = handle.join();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn stop_and_join_from_outside_waits_for_exit() {
        let (tx, rx) = mpsc::channel();
        let reactor = ReactorThread::spawn(
            "reactor-test".to_owned(),
            move || async move {
                let _ = tx.send(thread::current().name().map(str::to_owned));
                std::future::pending::<()>().await;
            },
            || {},
        )
        .expect("创建 Reactor 失败");

        let name = rx.recv_timeout(Duration::from_secs(5)).expect("Reactor 未运行");
        assert_eq!(name.as_deref(), Some("reactor-test"));
        assert!(!reactor.is_current());
        assert!(reactor.stop_and_join());
    }

    #[test]
    fn panic_inside_reactor_triggers_fault_hook() {
        let (tx, rx) = mpsc::channel();
        let reactor = ReactorThread::spawn(
            "reactor-panic".to_owned(),
            || async {
                if true {
                    panic!("boom");
                }
            },
            move || {
                let _ = tx.send(());
            },
        )
        .expect("创建 Reactor 失败");

        rx.recv_timeout(Duration::from_secs(5)).expect("故障钩子未执行");
        reactor.join();
    }
}
