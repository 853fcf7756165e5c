//! 作用域树
//!
//! 作用域是纯数据：id、名称、父节点、子节点、bundle 集合与共享策略。
//! 树本身不可变地被发布给读者，所有修改都经过 [`crate::ScopeUpdate`]。

use crate::policy::{PolicyType, PolicyMap, SharePolicies};
use infrastructure_common::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 作用域 id
pub type ScopeId = u64;

/// bundle id
pub type BundleId = u64;

/// 根作用域 id
pub const ROOT_SCOPE_ID: ScopeId = 0;

/// 根作用域名称
pub const ROOT_SCOPE_NAME: &str = "root";

/// 待安装 bundle 的描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// 符号名
    pub symbolic_name: String,
    /// 安装位置，全局唯一
    pub location: String,
}

impl BundleDescriptor {
    /// 创建 bundle 描述
    pub fn new(symbolic_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            location: location.into(),
        }
    }
}

/// 已安装的 bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    /// bundle id
    pub id: BundleId,
    /// 符号名
    pub symbolic_name: String,
    /// 安装位置
    pub location: String,
}

/// 作用域节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub(crate) id: ScopeId,
    pub(crate) name: String,
    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: BTreeSet<ScopeId>,
    pub(crate) bundles: BTreeSet<BundleId>,
    pub(crate) policies: SharePolicies,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, name: impl Into<String>, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            children: BTreeSet::new(),
            bundles: BTreeSet::new(),
            policies: SharePolicies::default(),
        }
    }

    /// 作用域 id
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// 作用域名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 父作用域，根作用域为 `None`
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// 子作用域
    pub fn children(&self) -> &BTreeSet<ScopeId> {
        &self.children
    }

    /// 所属 bundle
    pub fn bundles(&self) -> &BTreeSet<BundleId> {
        &self.bundles
    }

    /// 全部共享策略
    pub fn policies(&self) -> &SharePolicies {
        &self.policies
    }

    /// 某一方向的共享策略
    pub fn share_policies(&self, policy_type: PolicyType) -> &PolicyMap {
        self.policies.get(policy_type)
    }
}

/// 作用域树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTree {
    pub(crate) scopes: BTreeMap<ScopeId, Scope>,
    pub(crate) bundles: BTreeMap<BundleId, BundleInfo>,
    pub(crate) generation: u64,
    pub(crate) next_scope_id: ScopeId,
    pub(crate) next_bundle_id: BundleId,
}

impl ScopeTree {
    /// 只含根作用域的树
    pub fn new() -> Self {
        let mut scopes = BTreeMap::new();
        scopes.insert(ROOT_SCOPE_ID, Scope::new(ROOT_SCOPE_ID, ROOT_SCOPE_NAME, None));
        Self {
            scopes,
            bundles: BTreeMap::new(),
            generation: 0,
            next_scope_id: ROOT_SCOPE_ID + 1,
            next_bundle_id: 1,
        }
    }

    /// 根作用域
    pub fn root(&self) -> ScopeResult<&Scope> {
        self.require(ROOT_SCOPE_ID)
    }

    /// 版本号，每次成功提交加一
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 查找作用域
    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(&id)
    }

    /// 查找作用域，不存在时返回错误
    pub fn require(&self, id: ScopeId) -> ScopeResult<&Scope> {
        self.scopes
            .get(&id)
            .ok_or(ScopeError::NoSuchScope { scope_id: id })
    }

    /// 全部作用域
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.values()
    }

    /// 按名称查找第一个匹配的作用域（按 id 顺序）
    pub fn find_by_name(&self, name: &str) -> Option<&Scope> {
        self.scopes.values().find(|scope| scope.name == name)
    }

    /// 已安装的 bundle
    pub fn bundle(&self, id: BundleId) -> Option<&BundleInfo> {
        self.bundles.get(&id)
    }

    /// 全部已安装的 bundle
    pub fn bundles(&self) -> impl Iterator<Item = &BundleInfo> {
        self.bundles.values()
    }

    /// 按符号名查找 bundle
    pub fn bundle_by_name(&self, symbolic_name: &str) -> Option<&BundleInfo> {
        self.bundles
            .values()
            .find(|bundle| bundle.symbolic_name == symbolic_name)
    }

    /// 按安装位置查找 bundle
    pub fn bundle_by_location(&self, location: &str) -> Option<&BundleInfo> {
        self.bundles.values().find(|bundle| bundle.location == location)
    }

    /// bundle 所属的作用域
    pub fn bundle_owner(&self, bundle: BundleId) -> Option<ScopeId> {
        self.scopes
            .values()
            .find(|scope| scope.bundles.contains(&bundle))
            .map(|scope| scope.id)
    }

    /// 从给定作用域到根的路径（含两端）
    pub fn path_to_root(&self, id: ScopeId) -> ScopeResult<Vec<ScopeId>> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(scope_id) = current {
            if path.contains(&scope_id) {
                return Err(ScopeError::illegal_state(format!(
                    "作用域 {scope_id} 的父链存在环"
                )));
            }
            path.push(scope_id);
            current = self.require(scope_id)?.parent;
        }
        Ok(path)
    }

    /// 作用域及其全部后代
    pub fn subtree(&self, id: ScopeId) -> Vec<ScopeId> {
        let mut result = Vec::new();
        let mut pending = vec![id];
        while let Some(scope_id) = pending.pop() {
            if let Some(scope) = self.scopes.get(&scope_id) {
                result.push(scope_id);
                pending.extend(scope.children.iter().copied());
            }
        }
        result
    }

    /// 校验结构不变量：父子关系一致，每个 bundle 恰好属于一个作用域
    pub fn validate(&self) -> ScopeResult<()> {
        self.root()?;
        for scope in self.scopes.values() {
            if let Some(parent) = scope.parent {
                let parent = self.require(parent)?;
                if !parent.children.contains(&scope.id) {
                    return Err(ScopeError::illegal_state(format!(
                        "作用域 {} 未登记在父作用域 {} 下",
                        scope.id, parent.id
                    )));
                }
            } else if scope.id != ROOT_SCOPE_ID {
                return Err(ScopeError::illegal_state(format!(
                    "非根作用域 {} 没有父作用域",
                    scope.id
                )));
            }
            for child in &scope.children {
                if self.require(*child)?.parent != Some(scope.id) {
                    return Err(ScopeError::illegal_state(format!(
                        "子作用域 {child} 的父节点不是 {}",
                        scope.id
                    )));
                }
            }
            if let Some(message) = scope.policies.misplaced() {
                return Err(ScopeError::illegal_state(message));
            }
        }

        let mut owners: BTreeMap<BundleId, ScopeId> = BTreeMap::new();
        for scope in self.scopes.values() {
            for bundle in &scope.bundles {
                if !self.bundles.contains_key(bundle) {
                    return Err(ScopeError::illegal_state(format!(
                        "作用域 {} 含有未安装的 bundle {bundle}",
                        scope.id
                    )));
                }
                if let Some(other) = owners.insert(*bundle, scope.id) {
                    return Err(ScopeError::illegal_state(format!(
                        "bundle {bundle} 同时属于作用域 {other} 和 {}",
                        scope.id
                    )));
                }
            }
        }
        if let Some(orphan) = self.bundles.keys().find(|id| !owners.contains_key(id)) {
            return Err(ScopeError::illegal_state(format!(
                "bundle {orphan} 不属于任何作用域"
            )));
        }
        Ok(())
    }

    pub(crate) fn allocate_scope_id(&mut self) -> ScopeId {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        id
    }

    pub(crate) fn install(&mut self, descriptor: &BundleDescriptor) -> ScopeResult<BundleId> {
        if self.bundle_by_location(&descriptor.location).is_some() {
            return Err(ScopeError::illegal_state(format!(
                "位置 {} 已经安装了 bundle",
                descriptor.location
            )));
        }
        let id = self.next_bundle_id;
        self.next_bundle_id += 1;
        self.bundles.insert(
            id,
            BundleInfo {
                id,
                symbolic_name: descriptor.symbolic_name.clone(),
                location: descriptor.location.clone(),
            },
        );
        Ok(id)
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}
