//! 计划历史存储
//!
//! 已执行计划哈希的有界持久集合：单个 JSON 文件（小写十六进制 sha256 数组），
//! 构造时加载，每次插入即落盘，超过上限先淘汰最旧条目。
//! 写入走临时文件 + 重命名，读者不会看到半截文件；不做跨进程锁（见 DESIGN.md）。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::AgentError;

/// 历史上限：超过时从最旧开始淘汰
pub const HISTORY_CAP: usize = 1000;

/// 默认存储位置：每用户配置目录下的 weaver/plan_history.json
pub fn default_history_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weaver")
        .join("plan_history.json")
}

/// 计划哈希的持久存储；插入保持时间序，查询用哈希集合
#[derive(Debug)]
pub struct PlanHistoryManager {
    path: PathBuf,
    ordered: Vec<String>,
    known: HashSet<String>,
    cap: usize,
}

impl PlanHistoryManager {
    /// 打开（或新建）指定路径的历史文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        Self::open_with_cap(path, HISTORY_CAP)
    }

    pub fn open_with_cap(path: impl AsRef<Path>, cap: usize) -> Result<Self, AgentError> {
        let path = path.as_ref().to_path_buf();
        let ordered: Vec<String> = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data)
                .map_err(|e| AgentError::PersistenceError(format!("{}: {}", path.display(), e)))?
        } else {
            Vec::new()
        };
        let known = ordered.iter().cloned().collect();
        Ok(Self {
            path,
            ordered,
            known,
            cap,
        })
    }

    pub fn has(&self, hash: &str) -> bool {
        self.known.contains(hash)
    }

    /// 登记一个哈希并立刻落盘；已存在时不改变存储
    pub fn add(&mut self, hash: &str) -> Result<(), AgentError> {
        if self.known.contains(hash) {
            return Ok(());
        }
        self.ordered.push(hash.to_string());
        self.known.insert(hash.to_string());
        while self.ordered.len() > self.cap {
            let oldest = self.ordered.remove(0);
            self.known.remove(&oldest);
        }
        self.flush()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), AgentError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.ordered)
            .map_err(|e| AgentError::PersistenceError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_has() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan_history.json");
        let mut store = PlanHistoryManager::open(&path).unwrap();
        assert!(!store.has("abc"));
        store.add("abc").unwrap();
        assert!(store.has("abc"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reopen_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan_history.json");
        {
            let mut store = PlanHistoryManager::open(&path).unwrap();
            store.add("abc").unwrap();
            store.add("def").unwrap();
        }
        let mut store = PlanHistoryManager::open(&path).unwrap();
        assert!(store.has("abc"));
        assert_eq!(store.len(), 2);
        // 重复登记不改变存储大小
        store.add("abc").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cap_prunes_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan_history.json");
        let mut store = PlanHistoryManager::open_with_cap(&path, 3).unwrap();
        for h in ["h1", "h2", "h3", "h4"] {
            store.add(h).unwrap();
        }
        assert_eq!(store.len(), 3);
        assert!(!store.has("h1"));
        assert!(store.has("h4"));

        // 落盘内容同样被裁剪
        let reloaded = PlanHistoryManager::open_with_cap(&path, 3).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert!(!reloaded.has("h1"));
    }

    #[test]
    fn test_file_is_json_array_of_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan_history.json");
        let mut store = PlanHistoryManager::open(&path).unwrap();
        store.add("0a1b").unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec!["0a1b".to_string()]);
    }
}
