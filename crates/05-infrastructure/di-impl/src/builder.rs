//! 配方构建器
//!
//! 把组件元数据翻译为配方图，并在翻译时完成结构校验：
//! bean 必须能实例化、过滤器语法正确、服务导出至少有一个接口、
//! 构造参数要么全部带下标要么全部不带。

use crate::recipes::{
    BeanRecipe, CollectionKind, CollectionRecipe, IdRefRecipe, LifecycleMethod, ListenerRecipe,
    MapRecipe, PassThroughRecipe, RefRecipe, ReferenceListRecipe, ReferenceRecipe, ServiceQuery,
    ServiceRecipe, ValueRecipe,
};
use di_abstractions::{
    AutoExport, BeanArgument, BeanMetadata, BeanScope, ClassRegistry, CollectionMetadata,
    ComponentMetadata, ContainerDefaults, ListenerMetadata, Metadata, Recipe,
    ReferenceListMetadata, ReferenceMetadata, ServiceMetadata, ServiceReferenceMetadata,
    ServiceRegistry, TypeRef, Value,
};
use infrastructure_common::{ConstructionError, ConstructionResult, Filter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 配方构建器
pub struct RecipeBuilder {
    classes: Arc<ClassRegistry>,
    registry: Arc<dyn ServiceRegistry>,
    defaults: ContainerDefaults,
    anonymous: AtomicUsize,
}

impl RecipeBuilder {
    /// 创建配方构建器
    pub fn new(
        classes: Arc<ClassRegistry>,
        registry: Arc<dyn ServiceRegistry>,
        defaults: ContainerDefaults,
    ) -> Self {
        Self {
            classes,
            registry,
            defaults,
            anonymous: AtomicUsize::new(0),
        }
    }

    /// 翻译顶层组件
    pub fn build(&self, component: &ComponentMetadata) -> ConstructionResult<Arc<dyn Recipe>> {
        if component.id().is_empty() {
            return Err(ConstructionError::invalid_metadata(format!(
                "顶层 {} 组件必须有 ID",
                component.kind()
            )));
        }
        self.build_component(component)
    }

    fn build_component(&self, component: &ComponentMetadata) -> ConstructionResult<Arc<dyn Recipe>> {
        match component {
            ComponentMetadata::Bean(bean) => self.build_bean(bean),
            ComponentMetadata::Reference(reference) => self.build_reference(reference),
            ComponentMetadata::ReferenceList(list) => self.build_reference_list(list),
            ComponentMetadata::Service(service) => self.build_service(service),
        }
    }

    /// 翻译值描述
    pub fn build_value(&self, metadata: &Metadata) -> ConstructionResult<Arc<dyn Recipe>> {
        Ok(match metadata {
            Metadata::Value(value) => Arc::new(ValueRecipe::new(
                value.value.clone(),
                value.type_name.as_deref().map(TypeRef::parse),
            )),
            Metadata::Ref(name) => Arc::new(RefRecipe::new(name.clone())),
            Metadata::IdRef(name) => Arc::new(IdRefRecipe::new(name.clone())),
            Metadata::Null => Arc::new(PassThroughRecipe::anonymous(Value::Null)),
            Metadata::List(list) => self.build_collection(CollectionKind::List, list)?,
            Metadata::Set(set) => self.build_collection(CollectionKind::Set, set)?,
            Metadata::Map(map) => {
                let mut entries = Vec::with_capacity(map.entries.len());
                for (key, value) in &map.entries {
                    entries.push((self.build_value(key)?, self.build_value(value)?));
                }
                Arc::new(MapRecipe::new(
                    entries,
                    map.key_type.as_deref().map(TypeRef::parse),
                    map.value_type.as_deref().map(TypeRef::parse),
                ))
            }
            Metadata::Component(component) => self.build_inline(component)?,
        })
    }

    fn build_collection(
        &self,
        kind: CollectionKind,
        collection: &CollectionMetadata,
    ) -> ConstructionResult<Arc<dyn Recipe>> {
        let items = collection
            .items
            .iter()
            .map(|item| self.build_value(item))
            .collect::<ConstructionResult<Vec<_>>>()?;
        Ok(Arc::new(CollectionRecipe::new(
            kind,
            items,
            collection.value_type.as_deref().map(TypeRef::parse),
        )))
    }

    fn build_inline(&self, component: &ComponentMetadata) -> ConstructionResult<Arc<dyn Recipe>> {
        match component {
            ComponentMetadata::Bean(_) => self.build_component(component),
            _ if component.id().is_empty() => {
                // 引用与服务配方需要名称来登记部分对象
                let id = format!(
                    ".{}-{}",
                    component.kind(),
                    self.anonymous.fetch_add(1, Ordering::Relaxed)
                );
                let mut component = component.clone();
                match &mut component {
                    ComponentMetadata::Reference(r) => r.id = id,
                    ComponentMetadata::ReferenceList(r) => r.id = id,
                    ComponentMetadata::Service(s) => s.id = id,
                    ComponentMetadata::Bean(_) => {}
                }
                self.build_component(&component)
            }
            _ => self.build_component(component),
        }
    }

    fn build_bean(&self, bean: &BeanMetadata) -> ConstructionResult<Arc<dyn Recipe>> {
        let display = if bean.id.is_empty() {
            bean.class_name.clone().unwrap_or_else(|| "<内联 bean>".to_string())
        } else {
            bean.id.clone()
        };
        if bean.class_name.is_none() && bean.factory_component.is_none() {
            return Err(ConstructionError::invalid_metadata(format!(
                "bean {display} 既没有类名也没有工厂组件"
            )));
        }
        if bean.factory_component.is_some() && bean.factory_method.is_none() {
            return Err(ConstructionError::invalid_metadata(format!(
                "bean {display} 指定了工厂组件但没有工厂方法"
            )));
        }

        let name = (!bean.id.is_empty()).then(|| bean.id.clone());
        let mut recipe = BeanRecipe::new(name, bean.class_name.clone(), self.classes.clone());
        match (&bean.factory_component, &bean.factory_method) {
            (Some(component), Some(method)) => {
                recipe = recipe
                    .with_instance_factory(Arc::new(RefRecipe::new(component.clone())), method.clone());
            }
            (None, Some(method)) => recipe = recipe.with_static_factory(method.clone()),
            _ => {}
        }

        for argument in ordered_arguments(&display, &bean.arguments)? {
            recipe = recipe.with_argument(
                self.build_value(&argument.value)?,
                argument.value_type.as_deref().map(TypeRef::parse),
            );
        }
        for property in &bean.properties {
            recipe = recipe.with_property(property.name.clone(), self.build_value(&property.value)?);
        }

        let prototype = bean.scope == BeanScope::Prototype;
        let init = LifecycleMethod::resolve(
            bean.init_method.as_deref(),
            self.defaults.init_method.as_deref(),
        );
        let destroy = if prototype {
            None
        } else {
            LifecycleMethod::resolve(
                bean.destroy_method.as_deref(),
                self.defaults.destroy_method.as_deref(),
            )
        };

        Ok(Arc::new(
            recipe
                .with_lifecycle(init, destroy)
                .with_prototype(prototype)
                .with_depends_on(bean.depends_on.clone())
                .with_reorder_arguments(
                    bean.reorder_arguments
                        .unwrap_or(self.defaults.reorder_arguments),
                ),
        ))
    }

    fn build_query(&self, query: &ServiceReferenceMetadata) -> ConstructionResult<ServiceQuery> {
        let filter_text = query.osgi_filter()?;
        let filter = Filter::parse(&filter_text)?;
        Ok(ServiceQuery {
            interfaces: query.interfaces.clone(),
            filter_text,
            filter,
        })
    }

    fn build_listeners(&self, query: &ServiceReferenceMetadata) -> Vec<ListenerRecipe> {
        query
            .listeners
            .iter()
            .map(|listener| match listener {
                ListenerMetadata::Direct(listener) => ListenerRecipe::Direct(listener.clone()),
                ListenerMetadata::Component {
                    component,
                    bind_method,
                    unbind_method,
                } => ListenerRecipe::Component {
                    component: Arc::new(RefRecipe::new(component.clone())),
                    bind_method: bind_method.clone(),
                    unbind_method: unbind_method.clone(),
                },
            })
            .collect()
    }

    fn build_reference(&self, reference: &ReferenceMetadata) -> ConstructionResult<Arc<dyn Recipe>> {
        let query = self.build_query(&reference.query)?;
        let timeout = Duration::from_millis(reference.timeout_ms.unwrap_or(self.defaults.timeout_ms));
        Ok(Arc::new(
            ReferenceRecipe::new(
                reference.id.clone(),
                query,
                timeout,
                self.registry.clone(),
                self.classes.clone(),
            )
            .with_listeners(self.build_listeners(&reference.query))
            .with_depends_on(reference.depends_on.clone()),
        ))
    }

    fn build_reference_list(
        &self,
        list: &ReferenceListMetadata,
    ) -> ConstructionResult<Arc<dyn Recipe>> {
        let query = self.build_query(&list.query)?;
        Ok(Arc::new(
            ReferenceListRecipe::new(
                list.id.clone(),
                query,
                list.member_type,
                list.ordering.clone(),
                self.registry.clone(),
                self.classes.clone(),
            )
            .with_listeners(self.build_listeners(&list.query))
            .with_depends_on(list.depends_on.clone()),
        ))
    }

    fn build_service(&self, service: &ServiceMetadata) -> ConstructionResult<Arc<dyn Recipe>> {
        if service.interfaces.is_empty() && service.auto_export == AutoExport::Disabled {
            return Err(ConstructionError::invalid_metadata(format!(
                "服务 {} 没有声明接口也没有启用自动导出",
                service.id
            )));
        }
        let component = self.build_value(&service.service_component)?;
        let mut recipe = ServiceRecipe::new(service.id.clone(), component, self.registry.clone())
            .with_interfaces(service.interfaces.clone(), service.auto_export)
            .with_properties(service.properties.clone(), service.ranking)
            .with_registration_listeners(service.registration_listeners.clone())
            .with_depends_on(service.depends_on.clone());
        if let Metadata::Ref(name) = &service.service_component {
            recipe = recipe.with_component_name(name.clone());
        }
        Ok(Arc::new(recipe))
    }
}

/// 按下标整理构造参数
fn ordered_arguments<'a>(
    bean: &str,
    arguments: &'a [BeanArgument],
) -> ConstructionResult<Vec<&'a BeanArgument>> {
    let indexed = arguments.iter().filter(|a| a.index.is_some()).count();
    if indexed == 0 {
        return Ok(arguments.iter().collect());
    }
    if indexed != arguments.len() {
        return Err(ConstructionError::invalid_metadata(format!(
            "bean {bean} 的构造参数必须全部指定下标或全部不指定"
        )));
    }
    let mut ordered: Vec<Option<&BeanArgument>> = vec![None; arguments.len()];
    for argument in arguments {
        let index = argument.index.unwrap_or_default();
        let Some(slot) = ordered.get_mut(index) else {
            return Err(ConstructionError::invalid_metadata(format!(
                "bean {bean} 的构造参数下标 {index} 越界"
            )));
        };
        if slot.is_some() {
            return Err(ConstructionError::invalid_metadata(format!(
                "bean {bean} 的构造参数下标 {index} 重复"
            )));
        }
        *slot = Some(argument);
    }
    Ok(ordered.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryServiceRegistry;

    fn builder() -> RecipeBuilder {
        RecipeBuilder::new(
            Arc::new(ClassRegistry::new()),
            Arc::new(InMemoryServiceRegistry::new()),
            ContainerDefaults::default(),
        )
    }

    #[test]
    fn test_bean_without_class_or_factory_is_rejected() {
        let result = builder().build(&BeanMetadata::new("a").into());
        assert!(matches!(result, Err(ConstructionError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_factory_component_requires_method() {
        let mut bean = BeanMetadata::new("a");
        bean.factory_component = Some("f".to_string());
        let result = builder().build(&bean.into());
        assert!(matches!(result, Err(ConstructionError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_mixed_argument_indexes_are_rejected() {
        let bean = BeanMetadata::new("a")
            .with_class("demo.A")
            .with_indexed_argument(0, Metadata::value("x"))
            .with_argument(Metadata::value("y"));
        let result = builder().build(&bean.into());
        assert!(matches!(result, Err(ConstructionError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_indexed_arguments_are_reordered() {
        let arguments = vec![
            BeanArgument {
                value: Metadata::value("second"),
                value_type: None,
                index: Some(1),
            },
            BeanArgument {
                value: Metadata::value("first"),
                value_type: None,
                index: Some(0),
            },
        ];
        let ordered = ordered_arguments("a", &arguments).unwrap();
        assert!(matches!(&ordered[0].value, Metadata::Value(v) if v.value == "first"));
        assert!(matches!(&ordered[1].value, Metadata::Value(v) if v.value == "second"));
    }

    #[test]
    fn test_invalid_reference_filter_is_rejected() {
        let reference = ReferenceMetadata::new(
            "r",
            ServiceReferenceMetadata::for_interface("demo.Api").with_filter("(broken"),
        );
        let result = builder().build(&reference.into());
        assert!(matches!(result, Err(ConstructionError::Filter { .. })));
    }

    #[test]
    fn test_service_needs_interfaces_or_auto_export() {
        let service = ServiceMetadata::new("s", Metadata::reference("a"));
        let result = builder().build(&service.into());
        assert!(matches!(result, Err(ConstructionError::InvalidMetadata { .. })));

        let service = ServiceMetadata::new("s", Metadata::reference("a"))
            .with_auto_export(AutoExport::Interfaces);
        assert!(builder().build(&service.into()).is_ok());
    }
}
