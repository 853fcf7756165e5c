//! 共享策略
//!
//! 一条策略是（方向，命名空间，过滤器）三元组。包级策略匹配
//! `osgi.wiring.package=<包名>`，服务级策略既匹配服务属性，
//! 也对每个接口名匹配 `scope.share.service=<接口名>`。

use infrastructure_common::{
    Filter, Properties, ScopeResult, OBJECT_CLASS, PACKAGE_NAMESPACE, SERVICE_NAMESPACE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 策略方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    /// 从外部导入
    Import,
    /// 向外部导出
    Export,
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Import => f.write_str("import"),
            Self::Export => f.write_str("export"),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SharePolicyRecord {
    policy_type: PolicyType,
    namespace: String,
    filter: String,
}

/// 共享策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SharePolicyRecord", into = "SharePolicyRecord")]
pub struct SharePolicy {
    policy_type: PolicyType,
    namespace: String,
    filter: Filter,
}

impl SharePolicy {
    /// 创建策略，过滤器语法错误时返回错误
    pub fn new(
        policy_type: PolicyType,
        namespace: impl Into<String>,
        filter: &str,
    ) -> ScopeResult<Self> {
        Ok(Self {
            policy_type,
            namespace: namespace.into(),
            filter: Filter::parse(filter)?,
        })
    }

    /// 包共享策略
    pub fn package(policy_type: PolicyType, filter: &str) -> ScopeResult<Self> {
        Self::new(policy_type, PACKAGE_NAMESPACE, filter)
    }

    /// 服务共享策略
    pub fn service(policy_type: PolicyType, filter: &str) -> ScopeResult<Self> {
        Self::new(policy_type, SERVICE_NAMESPACE, filter)
    }

    /// 策略方向
    pub fn policy_type(&self) -> PolicyType {
        self.policy_type
    }

    /// 命名空间
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 过滤器
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// 是否允许该包
    pub fn allows_package(&self, package: &str) -> bool {
        self.namespace == PACKAGE_NAMESPACE && self.filter.matches_attribute(PACKAGE_NAMESPACE, package)
    }

    /// 是否允许该服务
    pub fn allows_service(&self, service: &Properties) -> bool {
        if self.namespace != SERVICE_NAMESPACE {
            return false;
        }
        if self.filter.matches(service) {
            return true;
        }
        service
            .object_classes()
            .iter()
            .any(|class| self.filter.matches_attribute(SERVICE_NAMESPACE, class))
    }
}

impl TryFrom<SharePolicyRecord> for SharePolicy {
    type Error = infrastructure_common::FilterError;

    fn try_from(record: SharePolicyRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            policy_type: record.policy_type,
            namespace: record.namespace,
            filter: Filter::parse(&record.filter)?,
        })
    }
}

impl From<SharePolicy> for SharePolicyRecord {
    fn from(policy: SharePolicy) -> Self {
        Self {
            policy_type: policy.policy_type,
            namespace: policy.namespace,
            filter: policy.filter.to_string(),
        }
    }
}

/// 某一方向上按命名空间分组的策略
pub type PolicyMap = BTreeMap<String, Vec<SharePolicy>>;

/// 作用域的全部共享策略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharePolicies {
    #[serde(default)]
    imports: PolicyMap,
    #[serde(default)]
    exports: PolicyMap,
}

impl SharePolicies {
    /// 某一方向上的策略
    pub fn get(&self, policy_type: PolicyType) -> &PolicyMap {
        match policy_type {
            PolicyType::Import => &self.imports,
            PolicyType::Export => &self.exports,
        }
    }

    /// 某一方向上的策略（可修改）
    pub fn get_mut(&mut self, policy_type: PolicyType) -> &mut PolicyMap {
        match policy_type {
            PolicyType::Import => &mut self.imports,
            PolicyType::Export => &mut self.exports,
        }
    }

    /// 按命名空间添加策略
    pub fn add(&mut self, policy: SharePolicy) {
        self.get_mut(policy.policy_type)
            .entry(policy.namespace.clone())
            .or_default()
            .push(policy);
    }

    /// 该方向是否允许包
    pub fn allows_package(&self, policy_type: PolicyType, package: &str) -> bool {
        self.get(policy_type)
            .get(PACKAGE_NAMESPACE)
            .is_some_and(|policies| policies.iter().any(|p| p.allows_package(package)))
    }

    /// 该方向是否允许服务
    pub fn allows_service(&self, policy_type: PolicyType, service: &Properties) -> bool {
        self.get(policy_type)
            .get(SERVICE_NAMESPACE)
            .is_some_and(|policies| policies.iter().any(|p| p.allows_service(service)))
    }

    /// 校验所有策略都放在了与其方向和命名空间一致的位置
    pub(crate) fn misplaced(&self) -> Option<String> {
        for policy_type in [PolicyType::Import, PolicyType::Export] {
            for (namespace, policies) in self.get(policy_type) {
                if let Some(policy) = policies
                    .iter()
                    .find(|p| p.policy_type != policy_type || &p.namespace != namespace)
                {
                    return Some(format!(
                        "策略 {} {} {} 放在了 {} {} 下",
                        policy.policy_type, policy.namespace, policy.filter, policy_type, namespace
                    ));
                }
            }
        }
        None
    }
}

/// 以服务接口名构造用于策略匹配的属性
pub fn service_properties(interfaces: &[&str]) -> Properties {
    Properties::new().with(
        OBJECT_CLASS,
        interfaces.iter().map(ToString::to_string).collect::<Vec<_>>(),
    )
}
