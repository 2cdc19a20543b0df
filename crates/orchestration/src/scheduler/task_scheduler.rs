use std::collections::HashMap;

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// 最小调度间隔（毫秒）
pub const MIN_INTERVAL_MS: u64 = 100;

/// 固定间隔的后台任务调度器
///
/// 每次执行放在独立的 tokio 任务中，panic 只影响当次执行，
/// 任务在下一个周期照常运行。上一次执行未结束时不会重入。
pub struct TaskScheduler {
    periodic_tasks: HashMap<String, JoinHandle<()>>,
    shutdown_sender: broadcast::Sender<()>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        let (shutdown_sender, _) = broadcast::channel(16);
        Self {
            periodic_tasks: HashMap::new(),
            shutdown_sender,
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn add_periodic_task<F, Fut>(&mut self, name: &str, every_n_millis: u64, task_fn: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        if every_n_millis < MIN_INTERVAL_MS {
            return Err(anyhow!(
                "任务 {} 调度间隔过小: {}ms，最小 {}ms",
                name,
                every_n_millis,
                MIN_INTERVAL_MS
            ));
        }
        if self.periodic_tasks.contains_key(name) {
            return Err(anyhow!("任务已存在: {}", name));
        }

        let mut interval_timer = interval(Duration::from_millis(every_n_millis));
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_receiver.recv() => {
                        info!("定时任务停止: {}", task_name);
                        break;
                    }
                    _ = interval_timer.tick() => {
                        if let Err(e) = tokio::spawn(task_fn()).await {
                            if e.is_panic() {
                                error!("定时任务 panic，下个周期继续: {}", task_name);
                            } else {
                                error!("定时任务异常退出: {}, error={}", task_name, e);
                            }
                        }
                    }
                }
            }
        });
        info!("注册定时任务: {}, 间隔 {}ms", name, every_n_millis);
        self.periodic_tasks.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.periodic_tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.periodic_tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periodic_tasks.is_empty()
    }

    /// 发送停止信号并等待正在执行的任务结束
    pub async fn shutdown(self) {
        let _ = self.shutdown_sender.send(());
        for (name, handle) in self.periodic_tasks {
            if let Err(e) = handle.await {
                error!("等待定时任务结束失败: {}, error={}", name, e);
            }
        }
        info!("调度器已停止");
    }
}
