//! 去抖：一串快速输入只在静默 `delay` 之后发出最后一个值

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, mut on_settled: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();

        let task = tokio::spawn(async move {
            let mut pending: Option<T> = None;
            loop {
                match pending.take() {
                    None => match rx.recv().await {
                        Some(value) => pending = Some(value),
                        None => break,
                    },
                    Some(value) => {
                        tokio::select! {
                            next = rx.recv() => match next {
                                Some(next) => pending = Some(next),
                                None => break,
                            },
                            _ = sleep(delay) => on_settled(value),
                        }
                    }
                }
            }
        });

        Self { tx, task }
    }

    /// 提交一个新值，重新开始计时
    pub fn push(&self, value: T) {
        // 任务只会在 Drop 时结束
        let _ = self.tx.send(value);
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
