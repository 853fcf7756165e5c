//! 配方抽象
//!
//! 配方是一个延迟构建单元，描述如何创建对象图中的一个对象。
//! 配方在 [`ExecutionContext`] 中执行，上下文负责按名称缓存、
//! 检测重入并记录需要销毁的实例。

use crate::container::ContainerDefaults;
use crate::value::{TypeRef, Value};
use infrastructure_common::ConstructionResult;
use std::fmt;
use std::sync::Arc;

/// 配方 trait
pub trait Recipe: Send + Sync + fmt::Debug {
    /// 配方名称，内联配方为 `None`
    fn name(&self) -> Option<&str>;

    /// 直接嵌套的子配方
    fn dependencies(&self) -> Vec<Arc<dyn Recipe>> {
        Vec::new()
    }

    /// 按名称引用的其他组件（校验与依赖分析使用）
    fn referenced_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// 执行构建
    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value>;

    /// 是否需要在仓库销毁时回调
    fn has_destroy(&self) -> bool {
        false
    }

    /// 销毁由本配方创建的实例
    fn destroy(&self, _instance: &Value) {}

    /// 原型配方每次都创建新实例，不缓存也不跟踪销毁
    fn is_prototype(&self) -> bool {
        false
    }
}

/// 配方执行上下文
pub trait ExecutionContext {
    /// 获取或创建命名组件
    ///
    /// 已创建的单例直接返回；正在创建中的组件返回其部分对象，
    /// 没有部分对象时报告循环依赖。
    fn create(&mut self, name: &str) -> ConstructionResult<Value>;

    /// 执行嵌套配方（参数、属性、内联组件等）
    ///
    /// 需要销毁回调的嵌套实例同样登记到本次执行的销毁列表中，
    /// 随容器停止或执行回滚一起销毁。
    fn create_nested(&mut self, recipe: &Arc<dyn Recipe>) -> ConstructionResult<Value>;

    /// 是否存在该名称的组件或实例
    fn contains(&self, name: &str) -> bool;

    /// 登记正在构建中的部分对象，使循环引用可以解析到同一实例
    fn add_partial_object(&mut self, name: &str, value: Value);

    /// 把值转换为目标类型
    fn convert(&self, value: Value, target: &TypeRef) -> ConstructionResult<Value>;

    /// 值是否可以转换为目标类型
    fn can_convert(&self, value: &Value, target: &TypeRef) -> bool;

    /// 容器默认设置
    fn defaults(&self) -> &ContainerDefaults;
}
