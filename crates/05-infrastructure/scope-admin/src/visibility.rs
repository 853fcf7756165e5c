//! 可见性解析
//!
//! 给定消费者作用域与提供者作用域，沿两者的最近公共祖先计算边界穿越：
//! 从提供者向上到公共祖先（不含）的每个作用域都必须导出，从公共祖先
//! 向下到消费者的每个作用域都必须导入。父作用域因此隐式看到子作用域
//! 导出的内容，兄弟之间需要导出与导入成对出现。

use crate::policy::{PolicyType, SharePolicies};
use crate::scope::{ScopeId, ScopeTree};
use infrastructure_common::{Properties, ScopeResult};

impl ScopeTree {
    /// 消费者作用域能否看到提供者作用域中的包
    pub fn can_see_package(
        &self,
        consumer: ScopeId,
        provider: ScopeId,
        package: &str,
    ) -> ScopeResult<bool> {
        self.can_see(consumer, provider, |policies, policy_type| {
            policies.allows_package(policy_type, package)
        })
    }

    /// 消费者作用域能否看到提供者作用域中注册的服务
    pub fn can_see_service(
        &self,
        consumer: ScopeId,
        provider: ScopeId,
        service: &Properties,
    ) -> ScopeResult<bool> {
        self.can_see(consumer, provider, |policies, policy_type| {
            policies.allows_service(policy_type, service)
        })
    }

    fn can_see<F>(&self, consumer: ScopeId, provider: ScopeId, allows: F) -> ScopeResult<bool>
    where
        F: Fn(&SharePolicies, PolicyType) -> bool,
    {
        if consumer == provider {
            self.require(consumer)?;
            return Ok(true);
        }
        let upward = self.path_to_root(provider)?;
        let downward = self.path_to_root(consumer)?;
        let Some(ancestor) = downward.iter().copied().find(|id| upward.contains(id)) else {
            return Ok(false);
        };

        // 提供者是消费者的祖先时，提供者自身也是一道边界
        let exporters: &[ScopeId] = if ancestor == provider {
            &upward[..1]
        } else {
            let end = upward.iter().position(|id| *id == ancestor).unwrap_or(upward.len());
            &upward[..end]
        };
        let end = downward
            .iter()
            .position(|id| *id == ancestor)
            .unwrap_or(downward.len());
        let importers = &downward[..end];

        for id in exporters {
            if !allows(&self.require(*id)?.policies, PolicyType::Export) {
                return Ok(false);
            }
        }
        for id in importers {
            if !allows(&self.require(*id)?.policies, PolicyType::Import) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::policy::{service_properties, PolicyType, SharePolicy};
    use crate::ScopeAdmin;

    fn export_package(package: &str) -> SharePolicy {
        SharePolicy::package(PolicyType::Export, &format!("(osgi.wiring.package={package})")).unwrap()
    }

    fn import_package(package: &str) -> SharePolicy {
        SharePolicy::package(PolicyType::Import, &format!("(osgi.wiring.package={package})")).unwrap()
    }

    fn two_children(admin: &ScopeAdmin) -> (u64, u64) {
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("left").policies_mut().add(export_package("com.left"));
        update.new_child("right");
        assert!(update.commit().unwrap());
        let tree = admin.snapshot();
        (
            tree.find_by_name("left").unwrap().id(),
            tree.find_by_name("right").unwrap().id(),
        )
    }

    #[test]
    fn test_same_scope_is_always_visible() {
        let admin = ScopeAdmin::new();
        let (left, _) = two_children(&admin);
        assert!(admin.can_see_package(left, left, "anything").unwrap());
    }

    #[test]
    fn test_parent_sees_child_export_without_import() {
        let admin = ScopeAdmin::new();
        let (left, right) = two_children(&admin);
        assert!(admin.can_see_package(0, left, "com.left").unwrap());
        assert!(!admin.can_see_package(0, left, "com.other").unwrap());
        assert!(!admin.can_see_package(0, right, "com.left").unwrap());
    }

    #[test]
    fn test_sibling_needs_export_and_import() {
        let admin = ScopeAdmin::new();
        let (left, right) = two_children(&admin);
        assert!(!admin.can_see_package(right, left, "com.left").unwrap());

        let mut update = admin.new_scope_update().unwrap();
        update
            .child_mut("right")
            .unwrap()
            .policies_mut()
            .add(import_package("com.left"));
        assert!(update.commit().unwrap());
        assert!(admin.can_see_package(right, left, "com.left").unwrap());
    }

    #[test]
    fn test_child_needs_import_from_parent_export() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update.policies_mut().add(export_package("com.root"));
        update.new_child("app");
        assert!(update.commit().unwrap());
        let app = admin.snapshot().find_by_name("app").unwrap().id();
        assert!(!admin.can_see_package(app, 0, "com.root").unwrap());

        let mut update = admin.new_scope_update().unwrap();
        update
            .child_mut("app")
            .unwrap()
            .policies_mut()
            .add(import_package("com.root"));
        assert!(update.commit().unwrap());
        assert!(admin.can_see_package(app, 0, "com.root").unwrap());
    }

    #[test]
    fn test_service_visibility_uses_object_class() {
        let admin = ScopeAdmin::new();
        let mut update = admin.new_scope_update().unwrap();
        update.new_child("provider").policies_mut().add(
            SharePolicy::service(PolicyType::Export, "(scope.share.service=com.foo.Bar)").unwrap(),
        );
        assert!(update.commit().unwrap());
        let provider = admin.snapshot().find_by_name("provider").unwrap().id();

        assert!(admin
            .can_see_service(0, provider, &service_properties(&["com.foo.Bar"]))
            .unwrap());
        assert!(!admin
            .can_see_service(0, provider, &service_properties(&["com.foo.Baz"]))
            .unwrap());
    }

    #[test]
    fn test_unknown_scope_is_an_error() {
        let admin = ScopeAdmin::new();
        assert!(admin.can_see_package(0, 42, "a").is_err());
    }
}
