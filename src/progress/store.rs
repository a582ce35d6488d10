//! 根记录的持有者与持久化
//!
//! 根记录放在 `tokio::sync::watch` 通道中：读者取快照或订阅变更，写者提交 ProgressEvent，
//! 在通道锁内对最新记录做一次纯变换（读-改-写），因此多个调度并发完成也不会丢失更新。
//! 每次变更后把最新快照写入 JSON 文件（临时文件 + rename）；写盘失败只记日志。

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use crate::progress::{ProgressEvent, QuotaPolicy, UserProgress};

/// 从 JSON 文件加载根记录；文件不存在时返回 None
pub async fn load_state(path: &Path) -> anyhow::Result<Option<UserProgress>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read state file {}", path.display()))
        }
    };
    let progress = serde_json::from_str(&data)
        .with_context(|| format!("Corrupt state file {}", path.display()))?;
    Ok(Some(progress))
}

/// 写入根记录；父目录不存在时自动创建，先写临时文件再 rename
pub async fn save_state(path: &Path, progress: &UserProgress) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(progress)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// 根记录的唯一写入口
#[derive(Debug)]
pub struct ProgressStore {
    tx: watch::Sender<UserProgress>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl ProgressStore {
    /// 不落盘的存储（测试、演示）
    pub fn in_memory(initial: UserProgress) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// 加载持久化记录：缺失或损坏时使用全新记录；随后执行一次 24 小时窗口检查并写回
    pub async fn open(path: impl Into<PathBuf>, policy: QuotaPolicy, now: DateTime<Utc>) -> Self {
        let path = path.into();
        let loaded = match load_state(&path).await {
            Ok(Some(progress)) => progress,
            Ok(None) => {
                tracing::info!(path = %path.display(), "No saved progress, starting fresh");
                UserProgress::new(now, &policy)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable progress, starting fresh");
                UserProgress::new(now, &policy)
            }
        };

        let (tx, _rx) = watch::channel(loaded);
        let store = Self {
            tx,
            path: Some(path),
            write_lock: Mutex::new(()),
        };
        store
            .apply(ProgressEvent::LedgerChecked { now, policy })
            .await;
        store
    }

    /// 当前记录的快照
    pub fn snapshot(&self) -> UserProgress {
        self.tx.borrow().clone()
    }

    /// 订阅记录变更
    pub fn subscribe(&self) -> watch::Receiver<UserProgress> {
        self.tx.subscribe()
    }

    /// 以单次原子转移应用事件并持久化，返回新记录
    pub async fn apply(&self, event: ProgressEvent) -> UserProgress {
        let mut updated = None;
        self.tx.send_modify(|state| {
            let next = state.clone().apply(event);
            updated = Some(next.clone());
            *state = next;
        });
        self.persist().await;
        updated.unwrap_or_else(|| self.snapshot())
    }

    /// 写入最新快照；串行化写盘，保证最后落盘的是最新状态
    async fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let _guard = self.write_lock.lock().await;
        let latest = self.snapshot();
        if let Err(e) = save_state(path, &latest).await {
            tracing::warn!(error = %e, "Failed to persist progress");
        }
    }
}
