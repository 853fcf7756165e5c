//! 作用域管理入口

use crate::persistence::{ReconcileReport, ScopeStore};
use crate::scope::{BundleDescriptor, BundleId, BundleInfo, Scope, ScopeId, ScopeTree, ROOT_SCOPE_ID};
use crate::update::ScopeUpdate;
use infrastructure_common::{Properties, ScopeResult};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::info;

/// 作用域管理器
///
/// 读者拿到的是不可变的树快照，提交在提交锁下串行执行并整体替换快照。
/// 配置了存储时，每次成功提交都会先写盘再发布。
pub struct ScopeAdmin {
    tree: RwLock<Arc<ScopeTree>>,
    commit_lock: Mutex<()>,
    store: Option<ScopeStore>,
}

impl ScopeAdmin {
    /// 创建只含根作用域、不持久化的管理器
    pub fn new() -> Self {
        Self::from_tree(ScopeTree::new(), None)
    }

    /// 以给定的树创建管理器
    pub fn from_tree(tree: ScopeTree, store: Option<ScopeStore>) -> Self {
        Self {
            tree: RwLock::new(Arc::new(tree)),
            commit_lock: Mutex::new(()),
            store,
        }
    }

    /// 使用存储创建管理器，存在快照时从快照恢复
    pub fn with_store(store: ScopeStore) -> ScopeResult<Self> {
        let tree = match store.load()? {
            Some(tree) => tree,
            None => ScopeTree::new(),
        };
        Ok(Self::from_tree(tree, Some(store)))
    }

    /// 当前树快照
    pub fn snapshot(&self) -> Arc<ScopeTree> {
        self.tree.read().clone()
    }

    /// 当前版本号
    pub fn generation(&self) -> u64 {
        self.tree.read().generation()
    }

    /// 根作用域
    pub fn root(&self) -> ScopeResult<Scope> {
        self.scope(ROOT_SCOPE_ID)
    }

    /// 查找作用域
    pub fn scope(&self, id: ScopeId) -> ScopeResult<Scope> {
        self.tree.read().require(id).cloned()
    }

    /// 按名称查找作用域
    pub fn find_by_name(&self, name: &str) -> Option<Scope> {
        self.tree.read().find_by_name(name).cloned()
    }

    /// bundle 所属的作用域
    pub fn bundle_owner(&self, bundle: BundleId) -> Option<ScopeId> {
        self.tree.read().bundle_owner(bundle)
    }

    /// 已安装的 bundle
    pub fn bundle(&self, bundle: BundleId) -> Option<BundleInfo> {
        self.tree.read().bundle(bundle).cloned()
    }

    /// 针对根作用域的更新事务
    pub fn new_scope_update(&self) -> ScopeResult<ScopeUpdate<'_>> {
        self.new_scope_update_for(ROOT_SCOPE_ID)
    }

    /// 针对指定作用域子树的更新事务
    pub fn new_scope_update_for(&self, scope: ScopeId) -> ScopeResult<ScopeUpdate<'_>> {
        ScopeUpdate::new(self, self.snapshot(), scope)
    }

    /// 消费者作用域能否看到提供者作用域中的包
    pub fn can_see_package(
        &self,
        consumer: ScopeId,
        provider: ScopeId,
        package: &str,
    ) -> ScopeResult<bool> {
        self.snapshot().can_see_package(consumer, provider, package)
    }

    /// 消费者作用域能否看到提供者作用域中注册的服务
    pub fn can_see_service(
        &self,
        consumer: ScopeId,
        provider: ScopeId,
        service: &Properties,
    ) -> ScopeResult<bool> {
        self.snapshot().can_see_service(consumer, provider, service)
    }

    /// 以实际安装的 bundle 校正作用域树
    pub fn reconcile(&self, installed: &[BundleDescriptor]) -> ScopeResult<ReconcileReport> {
        let _guard = self.commit_lock.lock();
        let current = self.snapshot();
        let mut tree = (*current).clone();
        let report = tree.reconcile(installed)?;
        if report.has_drift() {
            tree.generation = current.generation() + 1;
            self.persist_and_swap(tree)?;
            info!(
                "作用域对账完成: 移除 {} 个, 收养 {} 个",
                report.dropped.len(),
                report.adopted.len()
            );
        }
        Ok(report)
    }

    pub(crate) fn publish(&self, tree: ScopeTree, base_generation: u64) -> ScopeResult<bool> {
        let _guard = self.commit_lock.lock();
        if self.generation() != base_generation {
            return Ok(false);
        }
        let generation = tree.generation();
        self.persist_and_swap(tree)?;
        info!("作用域更新已提交, 版本号 {}", generation);
        Ok(true)
    }

    fn persist_and_swap(&self, tree: ScopeTree) -> ScopeResult<()> {
        if let Some(store) = &self.store {
            store.save(&tree)?;
        }
        *self.tree.write() = Arc::new(tree);
        Ok(())
    }
}

impl Default for ScopeAdmin {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScopeAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeAdmin")
            .field("generation", &self.generation())
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_starts_with_root() {
        let admin = ScopeAdmin::new();
        let root = admin.root().unwrap();
        assert_eq!(root.id(), ROOT_SCOPE_ID);
        assert!(root.children().is_empty());
        assert_eq!(admin.generation(), 0);
    }

    #[test]
    fn test_update_for_subtree() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("app");
        assert!(update.commit().unwrap());
        let app = admin.find_by_name("app").unwrap().id();

        let mut update = admin.new_scope_update_for(app).unwrap();
        update.new_child("plugin");
        assert!(update.commit().unwrap());
        assert_eq!(admin.find_by_name("plugin").unwrap().parent(), Some(app));
        assert!(admin.new_scope_update_for(99).is_err());
    }

    #[test]
    fn test_reconcile_bumps_generation_only_on_drift() {
        let admin = ScopeAdmin::new();
        let report = admin.reconcile(&[]).unwrap();
        assert!(!report.has_drift());
        assert_eq!(admin.generation(), 0);

        let report = admin
            .reconcile(&[BundleDescriptor::new("a", "file:a.jar")])
            .unwrap();
        assert_eq!(report.adopted.len(), 1);
        assert_eq!(admin.generation(), 1);
        assert_eq!(admin.bundle_owner(report.adopted[0]), Some(ROOT_SCOPE_ID));
    }
}
