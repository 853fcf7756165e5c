//! 作用域更新事务
//!
//! [`ScopeUpdate`] 是作用域子树的可变草稿。创建时复制当前成员与策略，
//! 修改只作用于草稿，`commit` 在树的副本上应用全部修改并校验不变量，
//! 成功后整体替换，失败时原树保持不变。

use crate::admin::ScopeAdmin;
use crate::policy::{PolicyMap, PolicyType, SharePolicies};
use crate::scope::{BundleDescriptor, BundleId, Scope, ScopeId, ScopeTree};
use infrastructure_common::{ScopeError, ScopeResult};
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

/// 单个作用域的草稿
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeDraft {
    scope_id: Option<ScopeId>,
    name: String,
    bundles: BTreeSet<BundleId>,
    children: Vec<ScopeDraft>,
    policies: SharePolicies,
    bundles_to_install: Vec<BundleDescriptor>,
}

impl ScopeDraft {
    fn new(name: impl Into<String>) -> Self {
        Self {
            scope_id: None,
            name: name.into(),
            bundles: BTreeSet::new(),
            children: Vec::new(),
            policies: SharePolicies::default(),
            bundles_to_install: Vec::new(),
        }
    }

    fn snapshot(tree: &ScopeTree, scope: &Scope) -> ScopeResult<Self> {
        let children = scope
            .children
            .iter()
            .map(|child| Self::snapshot(tree, tree.require(*child)?))
            .collect::<ScopeResult<Vec<_>>>()?;
        Ok(Self {
            scope_id: Some(scope.id),
            name: scope.name.clone(),
            bundles: scope.bundles.clone(),
            children,
            policies: scope.policies.clone(),
            bundles_to_install: Vec::new(),
        })
    }

    /// 对应的作用域 id，新建的作用域在提交前为 `None`
    pub fn scope_id(&self) -> Option<ScopeId> {
        self.scope_id
    }

    /// 作用域名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 所属 bundle
    pub fn bundles(&self) -> &BTreeSet<BundleId> {
        &self.bundles
    }

    /// 所属 bundle（可修改）
    pub fn bundles_mut(&mut self) -> &mut BTreeSet<BundleId> {
        &mut self.bundles
    }

    /// 子作用域草稿
    pub fn children(&self) -> &[ScopeDraft] {
        &self.children
    }

    /// 子作用域草稿（可修改）。移除元素即删除整棵子树
    pub fn children_mut(&mut self) -> &mut Vec<ScopeDraft> {
        &mut self.children
    }

    /// 提交时安装到本作用域的 bundle
    pub fn bundles_to_install_mut(&mut self) -> &mut Vec<BundleDescriptor> {
        &mut self.bundles_to_install
    }

    /// 某一方向的共享策略
    pub fn share_policies(&self, policy_type: PolicyType) -> &PolicyMap {
        self.policies.get(policy_type)
    }

    /// 某一方向的共享策略（可修改）
    pub fn share_policies_mut(&mut self, policy_type: PolicyType) -> &mut PolicyMap {
        self.policies.get_mut(policy_type)
    }

    /// 全部共享策略（可修改）
    pub fn policies_mut(&mut self) -> &mut SharePolicies {
        &mut self.policies
    }

    /// 暂存一个新的子作用域
    pub fn new_child(&mut self, name: impl Into<String>) -> &mut ScopeDraft {
        self.children.push(Self::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// 按名称查找子作用域草稿
    pub fn child_mut(&mut self, name: &str) -> Option<&mut ScopeDraft> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    /// 按名称移除子作用域草稿
    pub fn remove_child(&mut self, name: &str) -> Option<ScopeDraft> {
        let index = self.children.iter().position(|child| child.name == name)?;
        Some(self.children.remove(index))
    }

    fn apply(
        &self,
        tree: &mut ScopeTree,
        parent: Option<ScopeId>,
        seen: &mut BTreeSet<ScopeId>,
    ) -> ScopeResult<ScopeId> {
        let id = match self.scope_id {
            Some(id) => {
                let existing = tree.require(id)?;
                if existing.parent != parent {
                    return Err(ScopeError::illegal_state(format!(
                        "作用域 {} 不能移动到新的父作用域",
                        existing.name
                    )));
                }
                id
            }
            None => {
                let id = tree.allocate_scope_id();
                tree.scopes.insert(id, Scope::new(id, self.name.clone(), parent));
                id
            }
        };
        if !seen.insert(id) {
            return Err(ScopeError::illegal_state(format!(
                "作用域 {id} 在更新中出现了多次"
            )));
        }

        let mut names = BTreeSet::new();
        for child in &self.children {
            if !names.insert(child.name.as_str()) {
                return Err(ScopeError::DuplicateName {
                    name: child.name.clone(),
                });
            }
        }
        if let Some(message) = self.policies.misplaced() {
            return Err(ScopeError::illegal_state(message));
        }
        if let Some(missing) = self.bundles.iter().find(|b| tree.bundle(**b).is_none()) {
            return Err(ScopeError::illegal_state(format!(
                "bundle {missing} 尚未安装"
            )));
        }

        let mut bundles = self.bundles.clone();
        for descriptor in &self.bundles_to_install {
            let bundle = tree.install(descriptor)?;
            debug!("安装 bundle {} ({}) 到作用域 {}", descriptor.symbolic_name, bundle, id);
            bundles.insert(bundle);
        }

        let mut children = BTreeSet::new();
        for child in &self.children {
            children.insert(child.apply(tree, Some(id), seen)?);
        }

        let previous = tree.require(id)?.children.clone();
        for removed in previous.difference(&children) {
            for scope in tree.subtree(*removed) {
                debug!("删除作用域 {}", scope);
                tree.scopes.remove(&scope);
            }
        }

        let scope = tree
            .scopes
            .get_mut(&id)
            .ok_or(ScopeError::NoSuchScope { scope_id: id })?;
        scope.children = children;
        scope.bundles = bundles;
        scope.policies = self.policies.clone();
        Ok(id)
    }
}

/// 作用域更新事务
///
/// 通过 `Deref` 直接访问根草稿，例如 `update.bundles_mut()`。
pub struct ScopeUpdate<'a> {
    admin: &'a ScopeAdmin,
    base: Arc<ScopeTree>,
    root: ScopeDraft,
}

impl<'a> ScopeUpdate<'a> {
    pub(crate) fn new(admin: &'a ScopeAdmin, base: Arc<ScopeTree>, scope: ScopeId) -> ScopeResult<Self> {
        let root = ScopeDraft::snapshot(&base, base.require(scope)?)?;
        Ok(Self { admin, base, root })
    }

    /// 创建事务时树的版本号
    pub fn base_generation(&self) -> u64 {
        self.base.generation()
    }

    /// 在树副本上应用草稿并校验，不发布
    pub fn preview(&self) -> ScopeResult<ScopeTree> {
        let mut tree = (*self.base).clone();
        let scope_id = self
            .root
            .scope_id
            .ok_or_else(|| ScopeError::illegal_state("事务的根草稿没有作用域 id"))?;
        let parent = self.base.require(scope_id)?.parent;
        self.root.apply(&mut tree, parent, &mut BTreeSet::new())?;
        tree.validate()?;
        tree.generation = self.base.generation() + 1;
        Ok(tree)
    }

    /// 提交更新
    ///
    /// 树在事务创建后被其他提交修改过时返回 `Ok(false)`；违反结构不变量时
    /// 返回 `ScopeError::IllegalState`，两种情况下树都保持不变。
    pub fn commit(&self) -> ScopeResult<bool> {
        if self.admin.generation() != self.base.generation() {
            return Ok(false);
        }
        let tree = self.preview()?;
        self.admin.publish(tree, self.base.generation())
    }
}

impl Deref for ScopeUpdate<'_> {
    type Target = ScopeDraft;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

impl DerefMut for ScopeUpdate<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.root
    }
}

impl std::fmt::Debug for ScopeUpdate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeUpdate")
            .field("base_generation", &self.base.generation())
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SharePolicy;
    use crate::scope::ROOT_SCOPE_ID;

    fn install(admin: &ScopeAdmin, name: &str) -> BundleId {
        let mut update = admin.new_scope_update().unwrap();
        update
            .bundles_to_install_mut()
            .push(BundleDescriptor::new(name, format!("file:{name}.jar")));
        assert!(update.commit().unwrap());
        admin.snapshot().bundle_by_name(name).unwrap().id
    }

    #[test]
    fn test_new_child_is_created_with_fresh_id() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("app");
        assert!(update.commit().unwrap());

        let tree = admin.snapshot();
        let app = tree.find_by_name("app").unwrap();
        assert_eq!(app.parent(), Some(ROOT_SCOPE_ID));
        assert!(tree.root().unwrap().children().contains(&app.id()));
        assert_eq!(tree.generation(), 1);
    }

    #[test]
    fn test_move_requires_removal_in_same_update() {
        let admin = ScopeAdmin::new();
        let bundle = install(&admin, "a");
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("app");
        assert!(update.commit().unwrap());

        let mut update = admin.new_scope_update().unwrap();
        update.child_mut("app").unwrap().bundles_mut().insert(bundle);
        let before = admin.snapshot();
        assert!(matches!(update.commit(), Err(ScopeError::IllegalState { .. })));
        assert_eq!(*admin.snapshot(), *before);

        update.bundles_mut().remove(&bundle);
        assert!(update.commit().unwrap());
        let app = admin.snapshot().find_by_name("app").unwrap().id();
        assert_eq!(admin.bundle_owner(bundle), Some(app));
    }

    #[test]
    fn test_removing_bundle_without_rehoming_fails() {
        let admin = ScopeAdmin::new();
        let bundle = install(&admin, "a");
        let mut update = admin.new_scope_update().unwrap();
        update.bundles_mut().remove(&bundle);
        assert!(matches!(update.commit(), Err(ScopeError::IllegalState { .. })));
    }

    #[test]
    fn test_stale_update_returns_false() {
        let admin = ScopeAdmin::new();
        let mut first = admin.new_scope_update().unwrap();
        let mut second = admin.new_scope_update().unwrap();
        first.new_child("one");
        second.new_child("two");
        assert!(first.commit().unwrap());
        assert!(!second.commit().unwrap());
        assert!(admin.snapshot().find_by_name("two").is_none());
    }

    #[test]
    fn test_duplicate_sibling_names_are_rejected() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("app");
        update.new_child("app");
        assert!(matches!(
            update.commit(),
            Err(ScopeError::DuplicateName { name }) if name == "app"
        ));
    }

    #[test]
    fn test_removing_child_removes_subtree() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("app").new_child("inner");
        assert!(update.commit().unwrap());
        assert_eq!(admin.snapshot().scopes().count(), 3);

        let mut update = admin.new_scope_update().unwrap();
        update.remove_child("app");
        assert!(update.commit().unwrap());
        assert_eq!(admin.snapshot().scopes().count(), 1);
    }

    #[test]
    fn test_removed_child_with_bundles_must_rehome_them() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update
            .new_child("app")
            .bundles_to_install_mut()
            .push(BundleDescriptor::new("a", "file:a.jar"));
        assert!(update.commit().unwrap());
        let bundle = admin.snapshot().bundle_by_name("a").unwrap().id;

        let mut update = admin.new_scope_update().unwrap();
        update.remove_child("app");
        assert!(update.commit().is_err());
        update.bundles_mut().insert(bundle);
        assert!(update.commit().unwrap());
        assert_eq!(admin.bundle_owner(bundle), Some(ROOT_SCOPE_ID));
    }

    #[test]
    fn test_policies_are_committed() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("app").policies_mut().add(
            SharePolicy::package(PolicyType::Export, "(osgi.wiring.package=com.app)").unwrap(),
        );
        assert!(update.commit().unwrap());

        let tree = admin.snapshot();
        let app = tree.find_by_name("app").unwrap();
        assert_eq!(
            app.share_policies(PolicyType::Export)
                .get(infrastructure_common::PACKAGE_NAMESPACE)
                .map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn test_misplaced_policy_is_rejected() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update
            .share_policies_mut(PolicyType::Import)
            .entry("wrong".to_string())
            .or_default()
            .push(SharePolicy::package(PolicyType::Import, "(osgi.wiring.package=a)").unwrap());
        assert!(matches!(update.commit(), Err(ScopeError::IllegalState { .. })));
    }
}
