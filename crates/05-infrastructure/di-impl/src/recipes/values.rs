//! 值、引用与集合配方

use crate::converter::dedup;
use di_abstractions::{ExecutionContext, Recipe, TypeRef, Value};
use infrastructure_common::{ConstructionError, ConstructionResult};
use std::sync::Arc;

/// 字面量配方，可选地转换为声明的类型
#[derive(Debug)]
pub struct ValueRecipe {
    value: String,
    value_type: Option<TypeRef>,
}

impl ValueRecipe {
    /// 创建字面量配方
    pub fn new(value: impl Into<String>, value_type: Option<TypeRef>) -> Self {
        Self {
            value: value.into(),
            value_type,
        }
    }
}

impl Recipe for ValueRecipe {
    fn name(&self) -> Option<&str> {
        None
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        let value = Value::Str(self.value.clone());
        match &self.value_type {
            Some(ty) => ctx.convert(value, ty),
            None => Ok(value),
        }
    }
}

/// 命名组件引用
#[derive(Debug)]
pub struct RefRecipe {
    target: String,
}

impl RefRecipe {
    /// 创建引用配方
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// 被引用的组件名
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Recipe for RefRecipe {
    fn name(&self) -> Option<&str> {
        None
    }

    fn referenced_names(&self) -> Vec<String> {
        vec![self.target.clone()]
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        ctx.create(&self.target)
    }
}

/// 组件名称配方，只校验名称存在并返回名称本身
#[derive(Debug)]
pub struct IdRefRecipe {
    target: String,
}

impl IdRefRecipe {
    /// 创建名称配方
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Recipe for IdRefRecipe {
    fn name(&self) -> Option<&str> {
        None
    }

    fn referenced_names(&self) -> Vec<String> {
        vec![self.target.clone()]
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        if ctx.contains(&self.target) {
            Ok(Value::Str(self.target.clone()))
        } else {
            Err(ConstructionError::no_such_component(&self.target))
        }
    }
}

/// 预先构建好的实例
#[derive(Debug)]
pub struct PassThroughRecipe {
    name: Option<String>,
    value: Value,
}

impl PassThroughRecipe {
    /// 创建命名的直通配方
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }

    /// 创建匿名的直通配方
    pub fn anonymous(value: Value) -> Self {
        Self { name: None, value }
    }
}

impl Recipe for PassThroughRecipe {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn create(&self, _ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        Ok(self.value.clone())
    }
}

/// 集合种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// 列表
    List,
    /// 集合
    Set,
}

/// 列表 / 集合配方
#[derive(Debug)]
pub struct CollectionRecipe {
    kind: CollectionKind,
    items: Vec<Arc<dyn Recipe>>,
    value_type: Option<TypeRef>,
}

impl CollectionRecipe {
    /// 创建集合配方
    pub fn new(kind: CollectionKind, items: Vec<Arc<dyn Recipe>>, value_type: Option<TypeRef>) -> Self {
        Self {
            kind,
            items,
            value_type,
        }
    }
}

impl Recipe for CollectionRecipe {
    fn name(&self) -> Option<&str> {
        None
    }

    fn dependencies(&self) -> Vec<Arc<dyn Recipe>> {
        self.items.clone()
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        let mut values = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let value = ctx.create_nested(item)?;
            values.push(match &self.value_type {
                Some(ty) => ctx.convert(value, ty)?,
                None => value,
            });
        }
        Ok(match self.kind {
            CollectionKind::List => Value::List(values),
            CollectionKind::Set => Value::Set(dedup(values)),
        })
    }
}

/// 映射配方
#[derive(Debug)]
pub struct MapRecipe {
    entries: Vec<(Arc<dyn Recipe>, Arc<dyn Recipe>)>,
    key_type: Option<TypeRef>,
    value_type: Option<TypeRef>,
}

impl MapRecipe {
    /// 创建映射配方
    pub fn new(
        entries: Vec<(Arc<dyn Recipe>, Arc<dyn Recipe>)>,
        key_type: Option<TypeRef>,
        value_type: Option<TypeRef>,
    ) -> Self {
        Self {
            entries,
            key_type,
            value_type,
        }
    }
}

impl Recipe for MapRecipe {
    fn name(&self) -> Option<&str> {
        None
    }

    fn dependencies(&self) -> Vec<Arc<dyn Recipe>> {
        self.entries
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect()
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let mut key = ctx.create_nested(key)?;
            if let Some(ty) = &self.key_type {
                key = ctx.convert(key, ty)?;
            }
            let mut value = ctx.create_nested(value)?;
            if let Some(ty) = &self.value_type {
                value = ctx.convert(value, ty)?;
            }
            // 重复的键以后出现的为准
            if let Some(existing) = entries.iter_mut().find(|(k, _)| k.same_instance(&key)) {
                existing.1 = value;
            } else {
                entries.push((key, value));
            }
        }
        Ok(Value::Map(entries))
    }
}
