//! Bean 配方

use crate::matcher;
use di_abstractions::{
    ClassDescriptor, ClassRegistry, ExecutionContext, Recipe, TypeRef, Value,
};
use infrastructure_common::{guard_callback, ConstructionError, ConstructionResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// 生命周期方法声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleMethod {
    /// 方法名
    pub name: String,
    /// 是否显式声明；显式声明的方法找不到时报错，容器默认方法找不到时跳过
    pub explicit: bool,
}

impl LifecycleMethod {
    /// 按 bean 声明与容器默认值解析
    ///
    /// 显式空字符串表示禁用。
    pub fn resolve(declared: Option<&str>, default: Option<&str>) -> Option<Self> {
        match declared {
            Some("") => None,
            Some(name) => Some(Self {
                name: name.to_string(),
                explicit: true,
            }),
            None => default.filter(|d| !d.is_empty()).map(|name| Self {
                name: name.to_string(),
                explicit: false,
            }),
        }
    }
}

/// 实例化方式
#[derive(Debug)]
enum Instantiation {
    Constructor,
    StaticFactory(String),
    InstanceFactory {
        factory: Arc<dyn Recipe>,
        method: String,
    },
}

/// Bean 配方
#[derive(Debug)]
pub struct BeanRecipe {
    name: Option<String>,
    class_name: Option<String>,
    classes: Arc<ClassRegistry>,
    instantiation: Instantiation,
    arguments: Vec<Arc<dyn Recipe>>,
    argument_types: Vec<Option<TypeRef>>,
    properties: Vec<(String, Arc<dyn Recipe>)>,
    init_method: Option<LifecycleMethod>,
    destroy_method: Option<LifecycleMethod>,
    prototype: bool,
    depends_on: Vec<String>,
    reorder_arguments: bool,
}

impl BeanRecipe {
    /// 创建通过构造方法实例化的 bean 配方
    pub fn new(name: Option<String>, class_name: Option<String>, classes: Arc<ClassRegistry>) -> Self {
        Self {
            name,
            class_name,
            classes,
            instantiation: Instantiation::Constructor,
            arguments: Vec::new(),
            argument_types: Vec::new(),
            properties: Vec::new(),
            init_method: None,
            destroy_method: None,
            prototype: false,
            depends_on: Vec::new(),
            reorder_arguments: false,
        }
    }

    /// 使用静态工厂方法
    pub fn with_static_factory(mut self, method: impl Into<String>) -> Self {
        self.instantiation = Instantiation::StaticFactory(method.into());
        self
    }

    /// 使用工厂组件的实例方法
    pub fn with_instance_factory(mut self, factory: Arc<dyn Recipe>, method: impl Into<String>) -> Self {
        self.instantiation = Instantiation::InstanceFactory {
            factory,
            method: method.into(),
        };
        self
    }

    /// 添加构造参数
    pub fn with_argument(mut self, recipe: Arc<dyn Recipe>, value_type: Option<TypeRef>) -> Self {
        self.arguments.push(recipe);
        self.argument_types.push(value_type);
        self
    }

    /// 添加属性注入
    pub fn with_property(mut self, name: impl Into<String>, recipe: Arc<dyn Recipe>) -> Self {
        self.properties.push((name.into(), recipe));
        self
    }

    /// 设置生命周期方法
    pub fn with_lifecycle(
        mut self,
        init_method: Option<LifecycleMethod>,
        destroy_method: Option<LifecycleMethod>,
    ) -> Self {
        self.init_method = init_method;
        self.destroy_method = destroy_method;
        self
    }

    /// 设置为原型作用域
    pub fn with_prototype(mut self, prototype: bool) -> Self {
        self.prototype = prototype;
        self
    }

    /// 设置显式依赖
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// 设置参数重排
    pub fn with_reorder_arguments(mut self, reorder: bool) -> Self {
        self.reorder_arguments = reorder;
        self
    }

    fn display_name(&self) -> String {
        match (&self.name, &self.class_name) {
            (Some(name), _) => name.clone(),
            (None, Some(class)) => format!("<内联 {class}>"),
            (None, None) => "<内联 bean>".to_string(),
        }
    }

    fn class(&self, name: &str) -> ConstructionResult<Arc<ClassDescriptor>> {
        self.classes.get(name).ok_or_else(|| {
            ConstructionError::invalid_metadata(format!("类未注册: {name}"))
        })
    }

    fn instantiate(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        let mut args = Vec::with_capacity(self.arguments.len());
        for argument in &self.arguments {
            args.push(ctx.create_nested(argument)?);
        }

        match &self.instantiation {
            Instantiation::Constructor => {
                let class_name = self.class_name.as_deref().ok_or_else(|| {
                    ConstructionError::invalid_metadata(format!(
                        "bean {} 没有指定类名",
                        self.display_name()
                    ))
                })?;
                let class = self.class(class_name)?;
                let chosen = matcher::select(
                    &*ctx,
                    class_name,
                    class.constructors(),
                    &args,
                    &self.argument_types,
                    self.reorder_arguments,
                )?;
                let executable = &class.constructors()[chosen.index];
                (executable.invoker)(chosen.args).map_err(|e| {
                    ConstructionError::invocation(
                        format!("{}.{}", class_name, executable.signature()),
                        e,
                    )
                })
            }
            Instantiation::StaticFactory(method) => {
                let class_name = self.class_name.as_deref().ok_or_else(|| {
                    ConstructionError::invalid_metadata(format!(
                        "bean {} 的静态工厂方法需要类名",
                        self.display_name()
                    ))
                })?;
                let class = self.class(class_name)?;
                let candidates = class.static_factories(method);
                let target = format!("{class_name}.{method}");
                let chosen = matcher::select(
                    &*ctx,
                    &target,
                    candidates,
                    &args,
                    &self.argument_types,
                    self.reorder_arguments,
                )?;
                let executable = &candidates[chosen.index];
                (executable.invoker)(chosen.args)
                    .map_err(|e| ConstructionError::invocation(executable.signature(), e))
            }
            Instantiation::InstanceFactory { factory, method } => {
                let factory = ctx.create_nested(factory)?;
                let class = self.class(&factory.type_name())?;
                let candidates = class.factory_methods(method);
                let target = format!("{}.{}", class.name(), method);
                let chosen = matcher::select(
                    &*ctx,
                    &target,
                    candidates,
                    &args,
                    &self.argument_types,
                    self.reorder_arguments,
                )?;
                let executable = &candidates[chosen.index];
                (executable.invoker)(&factory, chosen.args)
                    .map_err(|e| ConstructionError::invocation(executable.signature(), e))
            }
        }
    }

    fn inject_properties(
        &self,
        ctx: &mut dyn ExecutionContext,
        instance: &Value,
        class: Option<&ClassDescriptor>,
    ) -> ConstructionResult<()> {
        for (property, recipe) in &self.properties {
            let setter = class.and_then(|c| c.setter(property)).ok_or_else(|| {
                ConstructionError::NoMatchingExecutable {
                    target: format!("{}.{}", instance.type_name(), property),
                    detail: "找不到属性写入器".to_string(),
                }
            })?;
            let value = ctx.create_nested(recipe)?;
            let value = ctx.convert(value, &setter.ty)?;
            (setter.invoker)(instance, value).map_err(|e| {
                ConstructionError::invocation(format!("{}.{}", instance.type_name(), property), e)
            })?;
        }
        Ok(())
    }
}

impl Recipe for BeanRecipe {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn dependencies(&self) -> Vec<Arc<dyn Recipe>> {
        let mut nested = self.arguments.clone();
        nested.extend(self.properties.iter().map(|(_, r)| r.clone()));
        if let Instantiation::InstanceFactory { factory, .. } = &self.instantiation {
            nested.push(factory.clone());
        }
        nested
    }

    fn referenced_names(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        for dependency in &self.depends_on {
            ctx.create(dependency)?;
        }

        let instance = self.instantiate(ctx)?;
        debug!("实例化 bean: {} -> {}", self.display_name(), instance.type_name());

        let class = self.classes.get(&instance.type_name());
        let init = match &self.init_method {
            Some(method) => match class.as_ref().and_then(|c| c.lifecycle_method(&method.name)) {
                Some(invoker) => Some(invoker.clone()),
                None if method.explicit => {
                    return Err(ConstructionError::NoMatchingExecutable {
                        target: format!("{}.{}", instance.type_name(), method.name),
                        detail: "找不到初始化方法".to_string(),
                    });
                }
                None => None,
            },
            None => None,
        };

        if let Some(name) = &self.name {
            ctx.add_partial_object(name, instance.clone());
        }

        self.inject_properties(ctx, &instance, class.as_deref())?;

        if let (Some(invoker), Some(method)) = (init, &self.init_method) {
            invoker(&instance).map_err(|e| {
                ConstructionError::invocation(
                    format!("{}.{}", instance.type_name(), method.name),
                    e,
                )
            })?;
        }
        Ok(instance)
    }

    fn has_destroy(&self) -> bool {
        self.destroy_method.is_some() && !self.prototype
    }

    fn destroy(&self, instance: &Value) {
        let Some(method) = &self.destroy_method else {
            return;
        };
        let invoker = self
            .classes
            .get(&instance.type_name())
            .and_then(|c| c.lifecycle_method(&method.name).cloned());
        match invoker {
            Some(invoker) => {
                let what = format!("{} 的销毁方法 {}", self.display_name(), method.name);
                guard_callback(&what, || invoker(instance));
            }
            None if method.explicit => {
                warn!(
                    "{} 找不到销毁方法 {}，跳过",
                    self.display_name(),
                    method.name
                );
            }
            None => {}
        }
    }

    fn is_prototype(&self) -> bool {
        self.prototype
    }
}
