//! # Scope Admin
//!
//! 作用域隔离模型：作用域树、共享策略、事务式更新与可见性解析。
//!
//! ## 核心概念
//!
//! - [`ScopeTree`] - 不可变的作用域树快照，作用域只是数据
//! - [`ScopeUpdate`] - 写时复制的更新事务，`commit` 原子地校验并替换
//! - [`SharePolicy`] - 基于过滤器的导入/导出规则
//! - [`ScopeAdmin`] - 发布快照、串行化提交、可选持久化
//!
//! ## 使用示例
//!
//! ```rust
//! use scope_admin::{BundleDescriptor, ScopeAdmin};
//!
//! let admin = ScopeAdmin::new();
//! let mut update = admin.new_scope_update()?;
//! update
//!     .new_child("app")
//!     .bundles_to_install_mut()
//!     .push(BundleDescriptor::new("com.example.app", "file:app.jar"));
//! assert!(update.commit()?);
//! # Ok::<(), infrastructure_common::ScopeError>(())
//! ```

pub mod admin;
pub mod persistence;
pub mod policy;
pub mod scope;
pub mod update;
pub mod visibility;

pub use admin::ScopeAdmin;
pub use persistence::{ReconcileReport, ScopeSnapshot, ScopeStore, SNAPSHOT_FORMAT_VERSION};
pub use policy::{service_properties, PolicyMap, PolicyType, SharePolicies, SharePolicy};
pub use scope::{
    BundleDescriptor, BundleId, BundleInfo, Scope, ScopeId, ScopeTree, ROOT_SCOPE_ID,
    ROOT_SCOPE_NAME,
};
pub use update::{ScopeDraft, ScopeUpdate};
