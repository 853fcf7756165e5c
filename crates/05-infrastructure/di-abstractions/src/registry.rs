//! 服务注册表抽象接口
//!
//! 动态的服务提供者注册表：服务随时注册、修改和注销，
//! 服务引用跟踪器通过监听器感知这些变化。

use crate::value::Value;
use infrastructure_common::{ConstructionResult, Filter, Properties};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// 服务引用
///
/// 指向注册表中的一个服务，携带注册时（或最近一次修改后）的属性快照。
/// 相等性按服务 ID 判断；排序上"更大"表示"更优"：排名高者优先，
/// 排名相同时先注册（ID 更小）者优先。
#[derive(Clone)]
pub struct ServiceReference {
    id: u64,
    properties: Arc<Properties>,
}

impl ServiceReference {
    /// 创建服务引用
    pub fn new(id: u64, properties: Properties) -> Self {
        Self {
            id,
            properties: Arc::new(properties),
        }
    }

    /// 服务 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 服务属性
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// 服务排名
    pub fn ranking(&self) -> i64 {
        self.properties.ranking()
    }

    /// 注册的接口名
    pub fn object_classes(&self) -> Vec<String> {
        self.properties.object_classes()
    }

    /// 是否匹配过滤器
    pub fn matches(&self, filter: &Filter) -> bool {
        filter.matches(&self.properties)
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceReference {}

impl PartialOrd for ServiceReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceReference {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.id == other.id {
            return Ordering::Equal;
        }
        self.ranking()
            .cmp(&other.ranking())
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.id)
            .field("ranking", &self.ranking())
            .field("object_classes", &self.object_classes())
            .finish()
    }
}

/// 服务事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEventKind {
    /// 已注册
    Registered,
    /// 属性已修改
    Modified,
    /// 属性修改后不再匹配监听器的过滤器
    ModifiedEndMatch,
    /// 即将注销
    Unregistering,
}

/// 服务事件
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    /// 事件类型
    pub kind: ServiceEventKind,
    /// 相关服务
    pub reference: ServiceReference,
}

impl ServiceEvent {
    /// 创建服务事件
    pub fn new(kind: ServiceEventKind, reference: ServiceReference) -> Self {
        Self { kind, reference }
    }
}

/// 服务监听器
pub trait ServiceListener: Send + Sync {
    /// 服务变化通知
    fn service_changed(&self, event: &ServiceEvent);
}

/// 监听器注册 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// 服务注册表 trait
pub trait ServiceRegistry: Send + Sync {
    /// 注册服务
    ///
    /// 属性中总会写入 `objectClass`、`service.id` 和 `service.ranking`。
    fn register(
        &self,
        interfaces: Vec<String>,
        service: Value,
        properties: Properties,
    ) -> ConstructionResult<ServiceReference>;

    /// 注销服务，服务不存在时返回 false
    fn unregister(&self, reference: &ServiceReference) -> bool;

    /// 替换服务属性，返回更新后的引用
    fn set_properties(
        &self,
        reference: &ServiceReference,
        properties: Properties,
    ) -> ConstructionResult<ServiceReference>;

    /// 查询匹配过滤器的服务引用，按从优到劣排序
    fn get_service_references(&self, filter: Option<&Filter>) -> Vec<ServiceReference>;

    /// 获取服务对象并增加使用计数
    fn get_service(&self, reference: &ServiceReference) -> Option<Value>;

    /// 释放服务对象，返回使用计数是否减少
    fn unget_service(&self, reference: &ServiceReference) -> bool;

    /// 当前使用计数
    fn use_count(&self, reference: &ServiceReference) -> usize;

    /// 添加服务监听器
    fn add_listener(&self, filter: Option<Filter>, listener: Arc<dyn ServiceListener>) -> ListenerId;

    /// 移除服务监听器
    fn remove_listener(&self, id: ListenerId) -> bool;
}
