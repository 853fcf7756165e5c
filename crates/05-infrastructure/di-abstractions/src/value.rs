//! 运行时值模型
//!
//! 配方引擎在运行时处理的所有值：字面量、集合以及类型擦除后的对象实例。

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// 类型擦除后的对象实例
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// 运行时值
#[derive(Clone)]
pub enum Value {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮点数
    Float(f64),
    /// 字符串
    Str(String),
    /// 列表
    List(Vec<Value>),
    /// 集合（保持插入顺序，元素去重）
    Set(Vec<Value>),
    /// 映射（保持插入顺序）
    Map(Vec<(Value, Value)>),
    /// 对象实例
    Object(ObjectRef),
}

impl Value {
    /// 把具体类型的实例包装为对象值
    pub fn object<T>(class: impl Into<String>, instance: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::Object(ObjectRef::new(class, Arc::new(instance)))
    }

    /// 把共享指针（可以是 trait 对象）包装为对象值
    pub fn shared<T>(class: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self::Object(ObjectRef::shared(class, instance))
    }

    /// 值的类型名称，用于诊断信息
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(_) => "boolean".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Str(_) => "string".to_string(),
            Self::List(_) => "list".to_string(),
            Self::Set(_) => "set".to_string(),
            Self::Map(_) => "map".to_string(),
            Self::Object(o) => o.class().to_string(),
        }
    }

    /// 是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 获取字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 获取整数
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 获取浮点数
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// 获取布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 获取列表或集合的元素
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// 获取映射条目
    pub fn as_entries(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// 获取对象引用
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// 按具体类型取出对象实例
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.as_object().and_then(ObjectRef::downcast::<T>)
    }

    /// 按共享视图（例如 trait 对象）取出对象实例
    pub fn downcast_shared<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.as_object().and_then(ObjectRef::downcast_shared::<T>)
    }

    /// 同一实例判断，对象按指针比较
    pub fn same_instance(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (a, b) => a == b,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Object(o) => write!(f, "{o:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) | Self::Set(items) => {
                let parts = items.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Map(entries) => {
                let parts = entries
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Object(o) => write!(f, "{}@{:p}", o.class(), Arc::as_ptr(&o.instance)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// 对象引用
///
/// 持有类名、实现的接口名、实例本身以及按接口暴露的共享视图。
/// 相等性按实例指针判断。
#[derive(Clone)]
pub struct ObjectRef {
    class: Arc<str>,
    interfaces: Arc<[String]>,
    instance: AnyInstance,
    views: Arc<[AnyInstance]>,
}

impl ObjectRef {
    /// 包装具体类型实例
    pub fn new<T>(class: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let class: String = class.into();
        Self {
            class: Arc::from(class.as_str()),
            interfaces: Arc::from(Vec::new()),
            instance,
            views: Arc::from(Vec::new()),
        }
    }

    /// 包装共享指针，实例以 `Arc<Arc<T>>` 形式保存，`T` 可以是 trait 对象
    pub fn shared<T>(class: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let class: String = class.into();
        let wrapped: AnyInstance = Arc::new(instance);
        Self {
            class: Arc::from(class.as_str()),
            interfaces: Arc::from(Vec::new()),
            instance: wrapped,
            views: Arc::from(Vec::new()),
        }
    }

    /// 设置实现的接口名
    pub fn with_interfaces(mut self, interfaces: Vec<String>) -> Self {
        self.interfaces = Arc::from(interfaces);
        self
    }

    /// 设置共享视图，每个视图是一个 `Arc<Arc<dyn Trait>>`
    pub fn with_views(mut self, views: Vec<AnyInstance>) -> Self {
        self.views = Arc::from(views);
        self
    }

    /// 类名
    pub fn class(&self) -> &str {
        &self.class
    }

    /// 实现的接口名
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// 是否可以当作指定的类或接口使用
    pub fn is_instance_of(&self, name: &str) -> bool {
        &*self.class == name || self.interfaces.iter().any(|i| i == name)
    }

    /// 原始实例
    pub fn instance(&self) -> &AnyInstance {
        &self.instance
    }

    /// 按具体类型取出实例
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.instance.clone().downcast::<T>().ok()
    }

    /// 按共享视图取出实例
    pub fn downcast_shared<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        std::iter::once(&self.instance)
            .chain(self.views.iter())
            .find_map(|candidate| candidate.downcast_ref::<Arc<T>>().cloned())
    }

    /// 指针相等
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("class", &self.class)
            .field("interfaces", &self.interfaces)
            .field("instance", &Arc::as_ptr(&self.instance))
            .finish()
    }
}

/// 类型引用
///
/// 描述构造参数、属性或显式参数类型注解的期望类型。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// 接受任意值
    Any,
    /// 布尔
    Bool,
    /// 整数
    Int,
    /// 浮点
    Float,
    /// 字符串
    Str,
    /// 列表
    List,
    /// 集合
    Set,
    /// 映射
    Map,
    /// 类或接口
    Class(String),
}

impl TypeRef {
    /// 解析类型名称，未知名称视为类名
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "" | "any" | "object" | "java.lang.Object" => Self::Any,
            "bool" | "boolean" | "java.lang.Boolean" => Self::Bool,
            "int" | "integer" | "long" | "short" | "byte" | "i32" | "i64" | "u32" | "u64"
            | "java.lang.Integer" | "java.lang.Long" | "java.lang.Short" => Self::Int,
            "float" | "double" | "f32" | "f64" | "java.lang.Float" | "java.lang.Double" => {
                Self::Float
            }
            "string" | "str" | "String" | "java.lang.String" => Self::Str,
            "list" | "collection" | "java.util.List" | "java.util.Collection" => Self::List,
            "set" | "java.util.Set" => Self::Set,
            "map" | "java.util.Map" => Self::Map,
            other => Self::Class(other.to_string()),
        }
    }
}

impl FromStr for TypeRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for TypeRef {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("boolean"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("string"),
            Self::List => f.write_str("list"),
            Self::Set => f.write_str("set"),
            Self::Map => f.write_str("map"),
            Self::Class(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_object_identity() {
        let a = Value::object("demo.A", 1u32);
        let b = a.clone();
        let c = Value::object("demo.A", 1u32);
        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&c));
        assert_eq!(a.downcast::<u32>().as_deref(), Some(&1));
    }

    #[test]
    fn test_shared_trait_object() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let value = Value::shared("demo.Greeter", greeter);
        let resolved = value.downcast_shared::<dyn Greeter>().unwrap();
        assert_eq!(resolved.greet(), "hello");
    }

    #[test]
    fn test_type_ref_parse() {
        assert_eq!(TypeRef::parse("java.lang.String"), TypeRef::Str);
        assert_eq!(TypeRef::parse("long"), TypeRef::Int);
        assert_eq!(TypeRef::parse("com.foo.Bar"), TypeRef::Class("com.foo.Bar".to_string()));
    }
}
