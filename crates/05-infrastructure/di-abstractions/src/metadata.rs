//! 组件元数据模型
//!
//! 声明式的 Blueprint 组件描述：bean、服务引用、引用列表和服务导出。
//! 配方构建器把这些元数据翻译为可执行的配方图。

use crate::listener::{ReferenceListener, RegistrationListener};
use crate::registry::ServiceReference;
use infrastructure_common::{
    combine_and, equality_clause, FilterError, Properties, COMPONENT_NAME, OBJECT_CLASS,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// 组件作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeanScope {
    /// 单例，同一容器内只创建一次
    #[default]
    Singleton,
    /// 原型，每次请求都创建新实例
    Prototype,
}

/// 激活方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// 容器启动时创建
    #[default]
    Eager,
    /// 首次请求时创建
    Lazy,
}

/// 服务引用的可用性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// 至少需要一个服务提供者
    #[default]
    Mandatory,
    /// 没有提供者也视为满足
    Optional,
}

/// 值元数据
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMetadata {
    /// 字面量字符串
    pub value: String,
    /// 可选的目标类型
    pub type_name: Option<String>,
}

/// 集合元数据
#[derive(Debug, Clone)]
pub struct CollectionMetadata {
    /// 元素
    pub items: Vec<Metadata>,
    /// 元素类型
    pub value_type: Option<String>,
}

/// 映射元数据
#[derive(Debug, Clone)]
pub struct MapMetadata {
    /// 键值对
    pub entries: Vec<(Metadata, Metadata)>,
    /// 键类型
    pub key_type: Option<String>,
    /// 值类型
    pub value_type: Option<String>,
}

/// 值描述
///
/// 构造参数、属性值和集合元素都用它描述。
#[derive(Debug, Clone)]
pub enum Metadata {
    /// 字面量
    Value(ValueMetadata),
    /// 引用另一个命名组件
    Ref(String),
    /// 组件名称本身（校验存在性）
    IdRef(String),
    /// 空值
    Null,
    /// 列表
    List(CollectionMetadata),
    /// 集合
    Set(CollectionMetadata),
    /// 映射
    Map(MapMetadata),
    /// 内联组件
    Component(Box<ComponentMetadata>),
}

impl Metadata {
    /// 无类型字面量
    pub fn value(value: impl Into<String>) -> Self {
        Self::Value(ValueMetadata {
            value: value.into(),
            type_name: None,
        })
    }

    /// 带类型的字面量
    pub fn typed_value(value: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::Value(ValueMetadata {
            value: value.into(),
            type_name: Some(type_name.into()),
        })
    }

    /// 组件引用
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(name.into())
    }

    /// 组件名称引用
    pub fn id_ref(name: impl Into<String>) -> Self {
        Self::IdRef(name.into())
    }

    /// 列表
    pub fn list(items: Vec<Metadata>) -> Self {
        Self::List(CollectionMetadata {
            items,
            value_type: None,
        })
    }

    /// 集合
    pub fn set(items: Vec<Metadata>) -> Self {
        Self::Set(CollectionMetadata {
            items,
            value_type: None,
        })
    }

    /// 映射
    pub fn map(entries: Vec<(Metadata, Metadata)>) -> Self {
        Self::Map(MapMetadata {
            entries,
            key_type: None,
            value_type: None,
        })
    }

    /// 内联组件
    pub fn component(component: impl Into<ComponentMetadata>) -> Self {
        Self::Component(Box::new(component.into()))
    }
}

/// 构造参数
#[derive(Debug, Clone)]
pub struct BeanArgument {
    /// 参数值
    pub value: Metadata,
    /// 显式类型注解，必须与形参类型完全一致
    pub value_type: Option<String>,
    /// 显式位置
    pub index: Option<usize>,
}

/// 属性注入
#[derive(Debug, Clone)]
pub struct BeanProperty {
    /// 属性名
    pub name: String,
    /// 属性值
    pub value: Metadata,
}

/// Bean 元数据
#[derive(Debug, Clone, Default)]
pub struct BeanMetadata {
    /// 组件 ID，内联 bean 为空
    pub id: String,
    /// 类名
    pub class_name: Option<String>,
    /// 工厂组件
    pub factory_component: Option<String>,
    /// 工厂方法（有工厂组件时为实例方法，否则为静态方法）
    pub factory_method: Option<String>,
    /// 构造参数
    pub arguments: Vec<BeanArgument>,
    /// 属性注入
    pub properties: Vec<BeanProperty>,
    /// 初始化方法；`Some("")` 表示禁用，`None` 表示使用容器默认值
    pub init_method: Option<String>,
    /// 销毁方法；语义同初始化方法
    pub destroy_method: Option<String>,
    /// 作用域
    pub scope: BeanScope,
    /// 激活方式
    pub activation: Activation,
    /// 显式依赖
    pub depends_on: Vec<String>,
    /// 是否允许参数重排，`None` 使用容器默认值
    pub reorder_arguments: Option<bool>,
}

impl BeanMetadata {
    /// 创建 bean 元数据
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// 创建内联 bean 元数据
    pub fn inline(class_name: impl Into<String>) -> Self {
        Self::default().with_class(class_name)
    }

    /// 设置类名
    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// 添加构造参数
    pub fn with_argument(mut self, value: Metadata) -> Self {
        self.arguments.push(BeanArgument {
            value,
            value_type: None,
            index: None,
        });
        self
    }

    /// 添加带类型注解的构造参数
    pub fn with_typed_argument(mut self, value: Metadata, value_type: impl Into<String>) -> Self {
        self.arguments.push(BeanArgument {
            value,
            value_type: Some(value_type.into()),
            index: None,
        });
        self
    }

    /// 添加指定位置的构造参数
    pub fn with_indexed_argument(mut self, index: usize, value: Metadata) -> Self {
        self.arguments.push(BeanArgument {
            value,
            value_type: None,
            index: Some(index),
        });
        self
    }

    /// 添加属性注入
    pub fn with_property(mut self, name: impl Into<String>, value: Metadata) -> Self {
        self.properties.push(BeanProperty {
            name: name.into(),
            value,
        });
        self
    }

    /// 设置初始化方法，空字符串表示禁用
    pub fn with_init_method(mut self, method: impl Into<String>) -> Self {
        self.init_method = Some(method.into());
        self
    }

    /// 设置销毁方法，空字符串表示禁用
    pub fn with_destroy_method(mut self, method: impl Into<String>) -> Self {
        self.destroy_method = Some(method.into());
        self
    }

    /// 使用静态工厂方法
    pub fn with_static_factory(mut self, method: impl Into<String>) -> Self {
        self.factory_method = Some(method.into());
        self
    }

    /// 使用工厂组件的实例方法
    pub fn with_factory(mut self, component: impl Into<String>, method: impl Into<String>) -> Self {
        self.factory_component = Some(component.into());
        self.factory_method = Some(method.into());
        self
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: BeanScope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置激活方式
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// 添加显式依赖
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// 设置是否允许参数重排
    pub fn with_reorder_arguments(mut self, reorder: bool) -> Self {
        self.reorder_arguments = Some(reorder);
        self
    }
}

/// 引用监听器声明
#[derive(Clone)]
pub enum ListenerMetadata {
    /// 直接提供的监听器对象
    Direct(Arc<dyn ReferenceListener>),
    /// 由命名组件的回调方法充当监听器，同名的所有重载都会被调用
    Component {
        /// 监听器组件
        component: String,
        /// 绑定回调名
        bind_method: Option<String>,
        /// 解绑回调名
        unbind_method: Option<String>,
    },
}

impl ListenerMetadata {
    /// 以组件回调方法声明监听器
    pub fn component(
        component: impl Into<String>,
        bind_method: impl Into<String>,
        unbind_method: impl Into<String>,
    ) -> Self {
        Self::Component {
            component: component.into(),
            bind_method: Some(bind_method.into()),
            unbind_method: Some(unbind_method.into()),
        }
    }
}

impl fmt::Debug for ListenerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct(<listener>)"),
            Self::Component {
                component,
                bind_method,
                unbind_method,
            } => f
                .debug_struct("Component")
                .field("component", component)
                .field("bind_method", bind_method)
                .field("unbind_method", unbind_method)
                .finish(),
        }
    }
}

/// 服务查询声明
///
/// 接口名、过滤器和组件名共同组成一个 OSGi 过滤器，至少需要一个约束。
#[derive(Debug, Clone, Default)]
pub struct ServiceReferenceMetadata {
    /// 要求的接口名
    pub interfaces: Vec<String>,
    /// 额外的过滤器表达式
    pub filter: Option<String>,
    /// 组件名约束
    pub component_name: Option<String>,
    /// 可用性，`None` 使用容器默认值
    pub availability: Option<Availability>,
    /// 绑定 / 解绑监听器
    pub listeners: Vec<ListenerMetadata>,
}

impl ServiceReferenceMetadata {
    /// 创建空查询
    pub fn new() -> Self {
        Self::default()
    }

    /// 按接口名创建查询
    pub fn for_interface(interface: impl Into<String>) -> Self {
        Self::new().with_interface(interface)
    }

    /// 添加接口名
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// 设置过滤器
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 设置组件名约束
    pub fn with_component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    /// 设置可用性
    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = Some(availability);
        self
    }

    /// 添加监听器
    pub fn with_listener(mut self, listener: ListenerMetadata) -> Self {
        self.listeners.push(listener);
        self
    }

    /// 拼出 OSGi 过滤器
    ///
    /// 显式过滤器（裸表达式会补上括号）、每个接口一个 `objectClass` 子句、
    /// 组件名子句，按顺序用 `&` 组合。
    pub fn osgi_filter(&self) -> Result<String, FilterError> {
        let mut clauses = Vec::new();
        if let Some(filter) = self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            if filter.starts_with('(') {
                clauses.push(filter.to_string());
            } else {
                clauses.push(format!("({filter})"));
            }
        }
        for interface in &self.interfaces {
            clauses.push(equality_clause(OBJECT_CLASS, interface));
        }
        if let Some(name) = &self.component_name {
            clauses.push(equality_clause(COMPONENT_NAME, name));
        }
        combine_and(&clauses)
    }
}

/// 单值服务引用
#[derive(Debug, Clone)]
pub struct ReferenceMetadata {
    /// 组件 ID
    pub id: String,
    /// 服务查询
    pub query: ServiceReferenceMetadata,
    /// 代理等待超时（毫秒），`None` 使用容器默认值
    pub timeout_ms: Option<u64>,
    /// 激活方式
    pub activation: Activation,
    /// 显式依赖
    pub depends_on: Vec<String>,
}

impl ReferenceMetadata {
    /// 创建单值服务引用
    pub fn new(id: impl Into<String>, query: ServiceReferenceMetadata) -> Self {
        Self {
            id: id.into(),
            query,
            timeout_ms: None,
            activation: Activation::Eager,
            depends_on: Vec::new(),
        }
    }

    /// 设置超时
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// 设置激活方式
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
}

/// 引用列表成员类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberType {
    /// 服务代理
    #[default]
    ServiceObject,
    /// 服务引用本身
    ServiceReference,
}

/// 服务引用比较器
pub type ReferenceComparator =
    Arc<dyn Fn(&ServiceReference, &ServiceReference) -> Ordering + Send + Sync>;

/// 引用列表排序方式
#[derive(Clone, Default)]
pub enum ReferenceOrdering {
    /// 按跟踪顺序
    #[default]
    Unordered,
    /// 自然顺序，最优的服务在前
    Natural,
    /// 自定义比较器
    Custom(ReferenceComparator),
}

impl fmt::Debug for ReferenceOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unordered => f.write_str("Unordered"),
            Self::Natural => f.write_str("Natural"),
            Self::Custom(_) => f.write_str("Custom(<comparator>)"),
        }
    }
}

/// 多值服务引用
#[derive(Debug, Clone)]
pub struct ReferenceListMetadata {
    /// 组件 ID
    pub id: String,
    /// 服务查询
    pub query: ServiceReferenceMetadata,
    /// 成员类型
    pub member_type: MemberType,
    /// 排序方式
    pub ordering: ReferenceOrdering,
    /// 激活方式
    pub activation: Activation,
    /// 显式依赖
    pub depends_on: Vec<String>,
}

impl ReferenceListMetadata {
    /// 创建多值服务引用
    pub fn new(id: impl Into<String>, query: ServiceReferenceMetadata) -> Self {
        Self {
            id: id.into(),
            query,
            member_type: MemberType::ServiceObject,
            ordering: ReferenceOrdering::Unordered,
            activation: Activation::Eager,
            depends_on: Vec::new(),
        }
    }

    /// 设置成员类型
    pub fn with_member_type(mut self, member_type: MemberType) -> Self {
        self.member_type = member_type;
        self
    }

    /// 设置排序方式
    pub fn with_ordering(mut self, ordering: ReferenceOrdering) -> Self {
        self.ordering = ordering;
        self
    }
}

/// 自动导出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoExport {
    /// 只使用显式声明的接口
    #[default]
    Disabled,
    /// 导出实例实现的所有接口
    Interfaces,
    /// 导出实例的类名
    ClassHierarchy,
    /// 类名与接口都导出
    AllClasses,
}

/// 服务导出
#[derive(Clone)]
pub struct ServiceMetadata {
    /// 组件 ID
    pub id: String,
    /// 被导出的组件（引用或内联 bean）
    pub service_component: Metadata,
    /// 显式接口名
    pub interfaces: Vec<String>,
    /// 自动导出方式
    pub auto_export: AutoExport,
    /// 服务属性
    pub properties: Properties,
    /// 服务排名
    pub ranking: i64,
    /// 注册监听器
    pub registration_listeners: Vec<Arc<dyn RegistrationListener>>,
    /// 激活方式
    pub activation: Activation,
    /// 显式依赖
    pub depends_on: Vec<String>,
}

impl ServiceMetadata {
    /// 创建服务导出
    pub fn new(id: impl Into<String>, service_component: Metadata) -> Self {
        Self {
            id: id.into(),
            service_component,
            interfaces: Vec::new(),
            auto_export: AutoExport::Disabled,
            properties: Properties::new(),
            ranking: 0,
            registration_listeners: Vec::new(),
            activation: Activation::Eager,
            depends_on: Vec::new(),
        }
    }

    /// 添加接口名
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// 设置自动导出
    pub fn with_auto_export(mut self, auto_export: AutoExport) -> Self {
        self.auto_export = auto_export;
        self
    }

    /// 添加服务属性
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<infrastructure_common::PropertyValue>,
    ) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// 设置排名
    pub fn with_ranking(mut self, ranking: i64) -> Self {
        self.ranking = ranking;
        self
    }

    /// 添加注册监听器
    pub fn with_registration_listener(mut self, listener: Arc<dyn RegistrationListener>) -> Self {
        self.registration_listeners.push(listener);
        self
    }
}

impl fmt::Debug for ServiceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMetadata")
            .field("id", &self.id)
            .field("service_component", &self.service_component)
            .field("interfaces", &self.interfaces)
            .field("auto_export", &self.auto_export)
            .field("properties", &self.properties)
            .field("ranking", &self.ranking)
            .field("registration_listeners", &self.registration_listeners.len())
            .field("activation", &self.activation)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// 组件元数据
#[derive(Debug, Clone)]
pub enum ComponentMetadata {
    /// Bean
    Bean(BeanMetadata),
    /// 单值服务引用
    Reference(ReferenceMetadata),
    /// 多值服务引用
    ReferenceList(ReferenceListMetadata),
    /// 服务导出
    Service(ServiceMetadata),
}

impl ComponentMetadata {
    /// 组件 ID
    pub fn id(&self) -> &str {
        match self {
            Self::Bean(m) => &m.id,
            Self::Reference(m) => &m.id,
            Self::ReferenceList(m) => &m.id,
            Self::Service(m) => &m.id,
        }
    }

    /// 激活方式
    pub fn activation(&self) -> Activation {
        match self {
            Self::Bean(m) => m.activation,
            Self::Reference(m) => m.activation,
            Self::ReferenceList(m) => m.activation,
            Self::Service(m) => m.activation,
        }
    }

    /// 显式依赖
    pub fn depends_on(&self) -> &[String] {
        match self {
            Self::Bean(m) => &m.depends_on,
            Self::Reference(m) => &m.depends_on,
            Self::ReferenceList(m) => &m.depends_on,
            Self::Service(m) => &m.depends_on,
        }
    }

    /// 组件类别名，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bean(_) => "bean",
            Self::Reference(_) => "reference",
            Self::ReferenceList(_) => "reference-list",
            Self::Service(_) => "service",
        }
    }
}

impl From<BeanMetadata> for ComponentMetadata {
    fn from(value: BeanMetadata) -> Self {
        Self::Bean(value)
    }
}

impl From<ReferenceMetadata> for ComponentMetadata {
    fn from(value: ReferenceMetadata) -> Self {
        Self::Reference(value)
    }
}

impl From<ReferenceListMetadata> for ComponentMetadata {
    fn from(value: ReferenceListMetadata) -> Self {
        Self::ReferenceList(value)
    }
}

impl From<ServiceMetadata> for ComponentMetadata {
    fn from(value: ServiceMetadata) -> Self {
        Self::Service(value)
    }
}
