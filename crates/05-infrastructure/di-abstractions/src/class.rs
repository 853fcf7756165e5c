//! 类描述符
//!
//! Rust 没有运行时反射，组件类的构造方法、工厂方法、属性写入器和生命周期方法
//! 都通过 [`ClassBuilder`] 显式注册，再由配方引擎按名称与参数类型匹配调用。

use crate::value::{AnyInstance, ObjectRef, TypeRef, Value};
use infrastructure_common::{BoxError, Properties};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 类型擦除后的静态调用
pub type StaticInvoker = Arc<dyn Fn(Vec<Value>) -> Result<Value, BoxError> + Send + Sync>;

/// 类型擦除后的实例方法调用
pub type InstanceInvoker =
    Arc<dyn Fn(&Value, Vec<Value>) -> Result<Value, BoxError> + Send + Sync>;

/// 生命周期方法（初始化 / 销毁）
pub type LifecycleInvoker = Arc<dyn Fn(&Value) -> Result<(), BoxError> + Send + Sync>;

/// 属性写入器
pub type SetterInvoker = Arc<dyn Fn(&Value, Value) -> Result<(), BoxError> + Send + Sync>;

/// 可调用成员：构造方法或工厂方法
#[derive(Clone)]
pub struct Executable<I> {
    /// 成员名称
    pub name: String,
    /// 参数类型
    pub params: Vec<TypeRef>,
    /// 调用入口
    pub invoker: I,
}

impl<I> Executable<I> {
    /// 参数个数
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// 成员签名，用于诊断信息
    pub fn signature(&self) -> String {
        let params = self.params.iter().map(ToString::to_string).collect::<Vec<_>>();
        format!("{}({})", self.name, params.join(", "))
    }
}

impl<I> fmt::Debug for Executable<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// 属性写入器描述
#[derive(Clone)]
pub struct PropertySetter {
    /// 属性类型
    pub ty: TypeRef,
    /// 写入入口
    pub invoker: SetterInvoker,
}

/// 服务回调的签名形式
#[derive(Clone)]
pub enum ServiceCallback {
    /// `(service)`
    Service(Arc<dyn Fn(&Value, &Value) -> Result<(), BoxError> + Send + Sync>),
    /// `(service, properties)`
    ServiceWithProperties(
        Arc<dyn Fn(&Value, &Value, &Properties) -> Result<(), BoxError> + Send + Sync>,
    ),
}

impl ServiceCallback {
    /// 调用回调
    pub fn invoke(&self, target: &Value, service: &Value, properties: &Properties) -> Result<(), BoxError> {
        match self {
            Self::Service(f) => f(target, service),
            Self::ServiceWithProperties(f) => f(target, service, properties),
        }
    }
}

/// 类描述符
#[derive(Clone)]
pub struct ClassDescriptor {
    name: String,
    interfaces: Vec<String>,
    constructors: Vec<Executable<StaticInvoker>>,
    static_factories: HashMap<String, Vec<Executable<StaticInvoker>>>,
    factory_methods: HashMap<String, Vec<Executable<InstanceInvoker>>>,
    setters: HashMap<String, PropertySetter>,
    lifecycle_methods: HashMap<String, LifecycleInvoker>,
    callbacks: HashMap<String, Vec<ServiceCallback>>,
}

impl ClassDescriptor {
    /// 类名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 实现的接口
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// 构造方法
    pub fn constructors(&self) -> &[Executable<StaticInvoker>] {
        &self.constructors
    }

    /// 指定名称的静态工厂方法
    pub fn static_factories(&self, name: &str) -> &[Executable<StaticInvoker>] {
        self.static_factories.get(name).map_or(&[], Vec::as_slice)
    }

    /// 指定名称的实例工厂方法
    pub fn factory_methods(&self, name: &str) -> &[Executable<InstanceInvoker>] {
        self.factory_methods.get(name).map_or(&[], Vec::as_slice)
    }

    /// 属性写入器
    pub fn setter(&self, property: &str) -> Option<&PropertySetter> {
        self.setters.get(property)
    }

    /// 生命周期方法
    pub fn lifecycle_method(&self, name: &str) -> Option<&LifecycleInvoker> {
        self.lifecycle_methods.get(name)
    }

    /// 同名的所有服务回调重载
    pub fn callbacks(&self, name: &str) -> &[ServiceCallback] {
        self.callbacks.get(name).map_or(&[], Vec::as_slice)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("interfaces", &self.interfaces)
            .field("constructors", &self.constructors)
            .field("static_factories", &self.static_factories.keys().collect::<Vec<_>>())
            .field("factory_methods", &self.factory_methods.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .field("lifecycle_methods", &self.lifecycle_methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

type TypedConstructor<T> = Arc<dyn Fn(Vec<Value>) -> Result<T, BoxError> + Send + Sync>;
type ViewFn<T> = Arc<dyn Fn(Arc<T>) -> AnyInstance + Send + Sync>;

/// 类描述符构建器
///
/// ```rust
/// use di_abstractions::{ClassBuilder, Value};
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct Greeter {
///     name: Mutex<String>,
/// }
///
/// let class = ClassBuilder::<Greeter>::new("demo.Greeter")
///     .constructor(&[], |_| Ok(Greeter::default()))
///     .property("name", "string", |g, v| {
///         *g.name.lock().unwrap() = v.to_string();
///         Ok(())
///     })
///     .build();
/// assert_eq!(class.constructors().len(), 1);
/// ```
pub struct ClassBuilder<T> {
    name: String,
    interfaces: Vec<String>,
    constructors: Vec<(Vec<TypeRef>, TypedConstructor<T>)>,
    static_factories: Vec<(String, Vec<TypeRef>, TypedConstructor<T>)>,
    factory_methods: HashMap<String, Vec<Executable<InstanceInvoker>>>,
    setters: HashMap<String, PropertySetter>,
    lifecycle_methods: HashMap<String, LifecycleInvoker>,
    callbacks: HashMap<String, Vec<ServiceCallback>>,
    views: Vec<ViewFn<T>>,
}

impl<T> ClassBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// 创建构建器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interfaces: Vec::new(),
            constructors: Vec::new(),
            static_factories: Vec::new(),
            factory_methods: HashMap::new(),
            setters: HashMap::new(),
            lifecycle_methods: HashMap::new(),
            callbacks: HashMap::new(),
            views: Vec::new(),
        }
    }

    /// 声明实现的接口名
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        self
    }

    /// 以 trait 对象形式暴露接口，使代理和消费者可以取得 `Arc<V>`
    pub fn view<V>(mut self, interface: impl Into<String>, cast: fn(Arc<T>) -> Arc<V>) -> Self
    where
        V: ?Sized + Send + Sync + 'static,
    {
        self = self.implements(interface);
        self.views.push(Arc::new(move |instance| {
            let shared: AnyInstance = Arc::new(cast(instance));
            shared
        }));
        self
    }

    /// 注册构造方法
    pub fn constructor<F>(mut self, params: &[&str], f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.constructors.push((parse_params(params), Arc::new(f)));
        self
    }

    /// 注册静态工厂方法
    pub fn static_factory<F>(mut self, name: impl Into<String>, params: &[&str], f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.static_factories
            .push((name.into(), parse_params(params), Arc::new(f)));
        self
    }

    /// 注册实例工厂方法，本类实例作为工厂组件时使用
    pub fn factory_method<F>(mut self, name: impl Into<String>, params: &[&str], f: F) -> Self
    where
        F: Fn(&T, Vec<Value>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let class = self.name.clone();
        let invoker: InstanceInvoker = Arc::new(move |target, args| {
            let this = downcast_target::<T>(target, &class)?;
            f(&this, args)
        });
        self.factory_methods
            .entry(name.clone())
            .or_default()
            .push(Executable {
                name,
                params: parse_params(params),
                invoker,
            });
        self
    }

    /// 注册属性写入器
    pub fn property<F>(mut self, name: impl Into<String>, ty: &str, f: F) -> Self
    where
        F: Fn(&T, Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        let invoker: SetterInvoker = Arc::new(move |target, value| {
            let this = downcast_target::<T>(target, &class)?;
            f(&this, value)
        });
        self.setters.insert(
            name.into(),
            PropertySetter {
                ty: TypeRef::parse(ty),
                invoker,
            },
        );
        self
    }

    /// 注册无参方法，可用作初始化或销毁方法
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        let invoker: LifecycleInvoker = Arc::new(move |target| {
            let this = downcast_target::<T>(target, &class)?;
            f(&this)
        });
        self.lifecycle_methods.insert(name.into(), invoker);
        self
    }

    /// 注册 `(service)` 形式的服务回调
    pub fn callback<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        let callback = ServiceCallback::Service(Arc::new(move |target, service| {
            let this = downcast_target::<T>(target, &class)?;
            f(&this, service)
        }));
        self.callbacks.entry(name.into()).or_default().push(callback);
        self
    }

    /// 注册 `(service, properties)` 形式的服务回调
    pub fn callback_with_properties<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &Value, &Properties) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        let callback =
            ServiceCallback::ServiceWithProperties(Arc::new(move |target, service, props| {
                let this = downcast_target::<T>(target, &class)?;
                f(&this, service, props)
            }));
        self.callbacks.entry(name.into()).or_default().push(callback);
        self
    }

    /// 构建类描述符
    pub fn build(self) -> ClassDescriptor {
        let wrap = Arc::new(InstanceWrapper {
            class: self.name.clone(),
            interfaces: self.interfaces.clone(),
            views: self.views,
        });

        let constructors = self
            .constructors
            .into_iter()
            .map(|(params, f)| Executable {
                name: "<init>".to_string(),
                params,
                invoker: wrap.erase(f),
            })
            .collect();

        let mut static_factories: HashMap<String, Vec<Executable<StaticInvoker>>> = HashMap::new();
        for (name, params, f) in self.static_factories {
            static_factories
                .entry(name.clone())
                .or_default()
                .push(Executable {
                    name,
                    params,
                    invoker: wrap.erase(f),
                });
        }

        ClassDescriptor {
            name: self.name,
            interfaces: self.interfaces,
            constructors,
            static_factories,
            factory_methods: self.factory_methods,
            setters: self.setters,
            lifecycle_methods: self.lifecycle_methods,
            callbacks: self.callbacks,
        }
    }
}

struct InstanceWrapper<T> {
    class: String,
    interfaces: Vec<String>,
    views: Vec<ViewFn<T>>,
}

impl<T> InstanceWrapper<T>
where
    T: Send + Sync + 'static,
{
    fn wrap(&self, instance: T) -> Value {
        let instance = Arc::new(instance);
        let views = self.views.iter().map(|view| view(instance.clone())).collect();
        Value::Object(
            ObjectRef::new(self.class.clone(), instance)
                .with_interfaces(self.interfaces.clone())
                .with_views(views),
        )
    }

    fn erase(self: &Arc<Self>, f: TypedConstructor<T>) -> StaticInvoker {
        let wrapper = Arc::clone(self);
        Arc::new(move |args| f(args).map(|instance| wrapper.wrap(instance)))
    }
}

fn parse_params(params: &[&str]) -> Vec<TypeRef> {
    params.iter().map(|p| TypeRef::parse(p)).collect()
}

fn downcast_target<T>(target: &Value, class: &str) -> Result<Arc<T>, BoxError>
where
    T: Send + Sync + 'static,
{
    target
        .downcast::<T>()
        .ok_or_else(|| format!("目标实例不是 {} 类型: {}", class, target.type_name()).into())
}

/// 类注册表
///
/// 按类名查找类描述符。
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Arc<ClassDescriptor>>,
}

impl ClassRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册类描述符，同名覆盖
    pub fn register(&mut self, descriptor: ClassDescriptor) -> &mut Self {
        self.classes
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        self
    }

    /// 链式注册
    pub fn with(mut self, descriptor: ClassDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// 查找类描述符
    pub fn get(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(name).cloned()
    }

    /// 是否已注册
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// 已注册的类数量
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    struct Widget {
        label: String,
    }

    impl Named for Widget {
        fn name(&self) -> String {
            self.label.clone()
        }
    }

    #[test]
    fn test_constructor_wraps_views_and_interfaces() {
        let class = ClassBuilder::<Widget>::new("demo.Widget")
            .view::<dyn Named>("demo.Named", |w| w)
            .constructor(&["string"], |args| {
                Ok(Widget {
                    label: args[0].to_string(),
                })
            })
            .build();

        let ctor = &class.constructors()[0];
        assert_eq!(ctor.signature(), "<init>(string)");

        let value = (ctor.invoker)(vec![Value::from("w1")]).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.class(), "demo.Widget");
        assert!(object.is_instance_of("demo.Named"));
        assert_eq!(value.downcast_shared::<dyn Named>().unwrap().name(), "w1");
        assert_eq!(value.downcast::<Widget>().unwrap().label, "w1");
    }

    #[test]
    fn test_method_rejects_foreign_target() {
        let class = ClassBuilder::<Widget>::new("demo.Widget")
            .method("init", |_| Ok(()))
            .build();
        let init = class.lifecycle_method("init").unwrap();
        assert!(init(&Value::object("demo.Other", 5u8)).is_err());
    }
}
