use crate::downloader::task::{DownloadTask, TaskSnapshot};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// 任务表
///
/// 所有读写都经过同一把互斥锁，锁只在簿记期间持有，从不跨越网络或磁盘 I/O。
/// ID 单调递增，BTreeMap 的遍历顺序即插入顺序
#[derive(Debug)]
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: u64,
    tasks: BTreeMap<u64, DownloadTask>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 1,
                tasks: BTreeMap::new(),
            }),
        }
    }

    /// 分配新ID并登记一个排队中的任务
    pub fn create(&self, url: String, save_dir: PathBuf, file_name: String) -> TaskSnapshot {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let task = DownloadTask::new(id, url, save_dir, file_name);
        let snapshot = task.snapshot();
        inner.tasks.insert(id, task);
        drop(inner);

        info!(
            "创建下载任务 #{}: {} -> {:?}",
            snapshot.id,
            snapshot.url,
            snapshot.destination()
        );
        snapshot
    }

    /// 请求取消任务，只对排队中或下载中的任务生效，可重复调用
    pub fn cancel(&self, id: u64) -> bool {
        let accepted = self
            .inner
            .lock()
            .tasks
            .get_mut(&id)
            .map(|task| task.request_cancel())
            .unwrap_or(false);

        if accepted {
            info!("任务 #{} 已请求取消", id);
        } else {
            debug!("任务 #{} 不存在或已结束，忽略取消请求", id);
        }
        accepted
    }

    pub fn get(&self, id: u64) -> Option<TaskSnapshot> {
        self.inner.lock().tasks.get(&id).map(DownloadTask::snapshot)
    }

    /// 按创建顺序返回所有任务的快照
    pub fn list(&self) -> Vec<TaskSnapshot> {
        self.inner
            .lock()
            .tasks
            .values()
            .map(DownloadTask::snapshot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 在锁内修改单个任务，任务不存在时返回 None
    pub(crate) fn update<R>(&self, id: u64, f: impl FnOnce(&mut DownloadTask) -> R) -> Option<R> {
        self.inner.lock().tasks.get_mut(&id).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::TaskStatus;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    fn create(registry: &TaskRegistry, name: &str) -> TaskSnapshot {
        registry.create(
            format!("https://example.com/{}", name),
            PathBuf::from("/tmp/downloads"),
            name.to_string(),
        )
    }

    #[test]
    fn test_ids_start_at_one() {
        let registry = TaskRegistry::new();
        assert!(registry.is_empty());

        let first = create(&registry, "a.bin");
        let second = create(&registry, "b.bin");

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, TaskStatus::Queued);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_list_in_insertion_order() {
        let registry = TaskRegistry::new();
        for name in ["c.bin", "a.bin", "b.bin"] {
            create(&registry, name);
        }

        let names: Vec<String> = registry.list().into_iter().map(|t| t.file_name).collect();
        assert_eq!(names, vec!["c.bin", "a.bin", "b.bin"]);
    }

    #[test]
    fn test_snapshots_are_copies() {
        let registry = TaskRegistry::new();
        let task = create(&registry, "a.bin");
        let before = registry.get(task.id).unwrap();

        registry.update(task.id, |t| {
            t.mark_downloading();
            t.record_progress(42, None);
        });

        assert_eq!(before.status, TaskStatus::Queued);
        assert_eq!(before.downloaded_bytes, 0);
        assert_eq!(registry.get(task.id).unwrap().downloaded_bytes, 42);
    }

    #[test]
    fn test_cancel_rules() {
        let registry = TaskRegistry::new();
        let queued = create(&registry, "queued.bin");
        let done = create(&registry, "done.bin");
        registry.update(done.id, |t| {
            t.mark_downloading();
            t.mark_completed();
        });

        assert!(registry.cancel(queued.id));
        // 幂等
        assert!(registry.cancel(queued.id));
        assert!(registry.get(queued.id).unwrap().cancel_requested);

        assert!(!registry.cancel(done.id));
        let done = registry.get(done.id).unwrap();
        assert!(!done.cancel_requested);
        assert_eq!(done.status, TaskStatus::Completed);

        assert!(!registry.cancel(999));
    }

    #[test]
    fn test_concurrent_create_unique_ids() {
        let registry = Arc::new(TaskRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| create(&registry, &format!("{}-{}.bin", worker, i)).id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            // 同一线程内严格递增
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all.extend(ids);
        }

        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(all.first(), Some(&1));
        assert_eq!(all.last(), Some(&400));

        let listed: Vec<u64> = registry.list().iter().map(|t| t.id).collect();
        assert!(listed.windows(2).all(|w| w[0] < w[1]));
    }

    proptest! {
        #[test]
        fn prop_ids_strictly_increasing(count in 1usize..64) {
            let registry = TaskRegistry::new();
            let ids: Vec<u64> = (0..count).map(|i| create(&registry, &i.to_string()).id).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(ids.len(), registry.len());
        }
    }
}
