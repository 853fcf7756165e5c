//! 作用域树持久化与重启后的对账

use crate::scope::{BundleDescriptor, BundleId, ScopeTree, ROOT_SCOPE_ID};
use chrono::{DateTime, Utc};
use infrastructure_common::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 快照格式版本
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// 持久化的作用域树快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    /// 格式版本
    pub version: u32,
    /// 保存时间
    pub saved_at: DateTime<Utc>,
    /// 作用域树
    pub tree: ScopeTree,
}

impl ScopeSnapshot {
    /// 以当前时间创建快照
    pub fn new(tree: ScopeTree) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            tree,
        }
    }

    /// 编码为 JSON
    pub fn encode(&self) -> ScopeResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| ScopeError::persistence("快照序列化失败", e))
    }

    /// 从 JSON 解码并校验
    pub fn decode(bytes: &[u8]) -> ScopeResult<Self> {
        let snapshot: Self = serde_json::from_slice(bytes)
            .map_err(|e| ScopeError::persistence("快照反序列化失败", e))?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(ScopeError::illegal_state(format!(
                "不支持的快照版本: {}",
                snapshot.version
            )));
        }
        snapshot.tree.validate()?;
        Ok(snapshot)
    }
}

/// 基于文件的快照存储
#[derive(Debug, Clone)]
pub struct ScopeStore {
    path: PathBuf,
}

impl ScopeStore {
    /// 创建存储
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 快照文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取快照，文件不存在时返回 `None`
    pub fn load(&self) -> ScopeResult<Option<ScopeTree>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("作用域快照不存在: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(ScopeError::persistence("读取作用域快照失败", e)),
        };
        let snapshot = ScopeSnapshot::decode(&bytes)?;
        info!(
            "加载作用域快照: {} (保存于 {}, 版本号 {})",
            self.path.display(),
            snapshot.saved_at,
            snapshot.tree.generation()
        );
        Ok(Some(snapshot.tree))
    }

    /// 写入快照，先写临时文件再重命名
    pub fn save(&self, tree: &ScopeTree) -> ScopeResult<()> {
        let bytes = ScopeSnapshot::new(tree.clone()).encode()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScopeError::persistence("创建快照目录失败", e))?;
        }
        let temp = self.path.with_extension("tmp");
        std::fs::write(&temp, bytes).map_err(|e| ScopeError::persistence("写入作用域快照失败", e))?;
        std::fs::rename(&temp, &self.path)
            .map_err(|e| ScopeError::persistence("替换作用域快照失败", e))?;
        debug!("保存作用域快照: {}", self.path.display());
        Ok(())
    }
}

/// 对账结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 快照中存在但已不再安装的 bundle
    pub dropped: Vec<BundleId>,
    /// 已安装但快照中没有的 bundle，分配到根作用域
    pub adopted: Vec<BundleId>,
}

impl ReconcileReport {
    /// 是否存在偏差
    pub fn has_drift(&self) -> bool {
        !self.dropped.is_empty() || !self.adopted.is_empty()
    }
}

impl ScopeTree {
    /// 以当前实际安装的 bundle（按安装位置）校正树
    pub fn reconcile(&mut self, installed: &[BundleDescriptor]) -> ScopeResult<ReconcileReport> {
        let locations: BTreeSet<&str> = installed.iter().map(|b| b.location.as_str()).collect();
        let mut report = ReconcileReport::default();

        let dropped: Vec<BundleId> = self
            .bundles
            .values()
            .filter(|bundle| !locations.contains(bundle.location.as_str()))
            .map(|bundle| bundle.id)
            .collect();
        for id in dropped {
            self.bundles.remove(&id);
            for scope in self.scopes.values_mut() {
                scope.bundles.remove(&id);
            }
            warn!("bundle {} 已不再安装，从作用域树中移除", id);
            report.dropped.push(id);
        }

        for descriptor in installed {
            if self.bundle_by_location(&descriptor.location).is_some() {
                continue;
            }
            let id = self.install(descriptor)?;
            self.scopes
                .get_mut(&ROOT_SCOPE_ID)
                .ok_or(ScopeError::NoSuchScope { scope_id: ROOT_SCOPE_ID })?
                .bundles
                .insert(id);
            warn!("发现未登记的 bundle {} ({})，分配到根作用域", descriptor.symbolic_name, id);
            report.adopted.push(id);
        }

        self.validate()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScopeStore::new(dir.path().join("scopes.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScopeStore::new(dir.path().join("nested").join("scopes.json"));
        let mut tree = ScopeTree::new();
        let id = tree.install(&BundleDescriptor::new("a", "file:a.jar")).unwrap();
        tree.scopes.get_mut(&ROOT_SCOPE_ID).unwrap().bundles.insert(id);

        store.save(&tree).unwrap();
        assert_eq!(store.load().unwrap(), Some(tree));
    }

    #[test]
    fn test_corrupt_snapshot_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            ScopeStore::new(path).load(),
            Err(ScopeError::Persistence { .. })
        ));
    }

    #[test]
    fn test_reconcile_drops_and_adopts() {
        let mut tree = ScopeTree::new();
        let gone = tree.install(&BundleDescriptor::new("gone", "file:gone.jar")).unwrap();
        let kept = tree.install(&BundleDescriptor::new("kept", "file:kept.jar")).unwrap();
        tree.scopes.get_mut(&ROOT_SCOPE_ID).unwrap().bundles.extend([gone, kept]);

        let report = tree
            .reconcile(&[
                BundleDescriptor::new("kept", "file:kept.jar"),
                BundleDescriptor::new("new", "file:new.jar"),
            ])
            .unwrap();

        assert_eq!(report.dropped, vec![gone]);
        assert_eq!(report.adopted.len(), 1);
        assert!(report.has_drift());
        assert!(tree.bundle(gone).is_none());
        assert_eq!(tree.bundle_owner(report.adopted[0]), Some(ROOT_SCOPE_ID));
    }
}
