use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::task::JoinHandle;

/// 协作式取消令牌
///
/// 流水线在每个资产、每种特征之间轮询该标志；收到取消后保留已写入的
/// 部分结果直接退出，不做回滚。
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 同名任务的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingJobPolicy {
    /// 已有同名任务在跑时丢弃新请求，内容变化触发的廉价去重
    Keep,
    /// 取消旧任务并以新任务顶替，显式用户操作用
    Replace,
}

struct JobEntry {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// 具名单飞任务注册表
///
/// 每个逻辑任务名下最多只有一个进行中的实例。Replace 只发出协作式取消，
/// 旧任务在下一个检查点自行退出，短暂的重叠由特征库的幂等写保证安全。
#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按策略调度一个任务，返回是否真的启动了新任务
    pub fn spawn<F, Fut>(&self, name: &str, policy: ExistingJobPolicy, f: F) -> bool
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.inner.lock().unwrap();
        jobs.retain(|_, entry| !entry.handle.is_finished());

        if let Some(entry) = jobs.get(name) {
            match policy {
                ExistingJobPolicy::Keep => {
                    debug!("任务 {name} 已在运行，丢弃新请求");
                    return false;
                }
                ExistingJobPolicy::Replace => {
                    debug!("取消任务 {name} 的旧实例");
                    entry.cancel.cancel();
                }
            }
        }

        let cancel = CancelToken::new();
        let handle = tokio::spawn(f(cancel.clone()));
        jobs.insert(name.to_string(), JobEntry { cancel, handle });
        true
    }

    pub fn is_running(&self, name: &str) -> bool {
        let jobs = self.inner.lock().unwrap();
        jobs.get(name).map(|e| !e.handle.is_finished()).unwrap_or(false)
    }

    /// 进行中任务的数量，顺带清掉已结束的登记项
    pub fn len(&self) -> usize {
        let mut jobs = self.inner.lock().unwrap();
        jobs.retain(|_, entry| !entry.handle.is_finished());
        jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 协作式取消某个任务，任务不存在时返回 false
    pub fn cancel(&self, name: &str) -> bool {
        let jobs = self.inner.lock().unwrap();
        match jobs.get(name) {
            Some(entry) if !entry.handle.is_finished() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn keep_drops_duplicate() {
        let registry = JobRegistry::new();
        let started = Arc::new(AtomicUsize::new(0));

        let s = started.clone();
        assert!(registry.spawn("job", ExistingJobPolicy::Keep, move |cancel| async move {
            s.fetch_add(1, Ordering::SeqCst);
            while !cancel.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }));
        let s = started.clone();
        assert!(!registry.spawn("job", ExistingJobPolicy::Keep, move |_| async move {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(registry.is_running("job"));
        registry.cancel("job");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replace_cancels_previous() {
        let registry = JobRegistry::new();
        let cancelled = Arc::new(AtomicBool::new(false));

        let c = cancelled.clone();
        registry.spawn("job", ExistingJobPolicy::Replace, move |cancel| async move {
            while !cancel.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            c.store(true, Ordering::SeqCst);
        });
        assert!(registry.spawn("job", ExistingJobPolicy::Replace, move |_| async move {}));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn finished_job_can_be_respawned() {
        let registry = JobRegistry::new();
        registry.spawn("job", ExistingJobPolicy::Keep, |_| async {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!registry.is_running("job"));
        assert!(registry.spawn("job", ExistingJobPolicy::Keep, |_| async {}));
    }

    #[tokio::test]
    async fn finished_entries_are_pruned() {
        let registry = JobRegistry::new();
        registry.spawn("a", ExistingJobPolicy::Keep, |_| async {});
        registry.spawn("b", ExistingJobPolicy::Keep, |_| async {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.is_empty());

        registry.spawn("a", ExistingJobPolicy::Keep, |cancel| async move {
            while !cancel.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        assert_eq!(registry.len(), 1);
        registry.cancel("a");
    }
}
