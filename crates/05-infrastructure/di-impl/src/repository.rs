//! Blueprint 对象仓库
//!
//! 以名称为键的槽位表，每个槽位保存配方和（已创建的）实例。
//! 创建在一次 [`ExecutionPass`] 中进行：执行期间的新实例只记录在本次执行中，
//! 全部成功后才提交到仓库；任何一步失败，本次创建的对象按逆序销毁，仓库保持不变。
//! 销毁列表按创建顺序追加，[`BlueprintRepository::destroy`] 逆序执行。

use crate::converter::Converter;
use di_abstractions::{ContainerDefaults, ExecutionContext, Recipe, TypeRef, Value};
use infrastructure_common::{guard_callback, ConstructionError, ConstructionResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Slot {
    name: String,
    recipe: Option<Arc<dyn Recipe>>,
    instance: Option<Value>,
}

struct DestroyEntry {
    name: String,
    recipe: Arc<dyn Recipe>,
    instance: Value,
}

impl DestroyEntry {
    fn run(self) {
        let what = format!("组件 {} 的销毁回调", self.name);
        let recipe = self.recipe;
        let instance = self.instance;
        guard_callback(&what, move || {
            recipe.destroy(&instance);
            Ok(())
        });
    }
}

/// 对象仓库
pub struct BlueprintRepository {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    destroy_list: Vec<DestroyEntry>,
    converter: Converter,
    defaults: ContainerDefaults,
}

impl BlueprintRepository {
    /// 创建空仓库
    pub fn new(defaults: ContainerDefaults) -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            destroy_list: Vec::new(),
            converter: Converter::new(),
            defaults,
        }
    }

    /// 添加命名配方
    pub fn put_recipe(&mut self, recipe: Arc<dyn Recipe>) -> ConstructionResult<()> {
        let name = recipe
            .name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ConstructionError::invalid_metadata("顶层配方必须有名称"))?
            .to_string();
        if self.index.contains_key(&name) {
            return Err(ConstructionError::NameAlreadyBound { name });
        }
        debug!("添加配方: {}", name);
        self.push_slot(name, Some(recipe), None);
        Ok(())
    }

    /// 绑定实例
    ///
    /// 名称已绑定到独立实例时报错；名称对应的配方已创建过实例时，
    /// 新实例替换绑定，旧实例的销毁回调仍留在销毁列表中，
    /// 由下一次 [`destroy`](Self::destroy) 执行。新实例不登记销毁回调。
    pub fn add(&mut self, name: &str, instance: Value) -> ConstructionResult<()> {
        let Some(&slot) = self.index.get(name) else {
            self.push_slot(name.to_string(), None, Some(instance));
            return Ok(());
        };
        let slot = &mut self.slots[slot];
        match (&slot.recipe, &slot.instance) {
            (None, Some(_)) => Err(ConstructionError::NameAlreadyBound {
                name: name.to_string(),
            }),
            (Some(recipe), Some(_)) => {
                if recipe.has_destroy() {
                    info!("组件 {} 的实例被替换，旧实例将在仓库销毁时销毁", name);
                }
                slot.instance = Some(instance);
                Ok(())
            }
            (_, None) => {
                slot.instance = Some(instance);
                Ok(())
            }
        }
    }

    /// 获取已创建的实例
    pub fn get_instance(&self, name: &str) -> Option<Value> {
        self.slot(name).and_then(|s| s.instance.clone())
    }

    /// 获取配方
    pub fn get_recipe(&self, name: &str) -> Option<Arc<dyn Recipe>> {
        self.slot(name).and_then(|s| s.recipe.clone())
    }

    /// 是否存在该名称
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// 所有名称，按添加顺序
    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }

    /// 校验所有按名称引用的组件都存在
    pub fn validate(&self) -> ConstructionResult<()> {
        let mut visited = HashSet::new();
        for slot in &self.slots {
            if let Some(recipe) = &slot.recipe {
                self.validate_recipe(recipe, &mut visited)?;
            }
        }
        Ok(())
    }

    fn validate_recipe(
        &self,
        recipe: &Arc<dyn Recipe>,
        visited: &mut HashSet<*const ()>,
    ) -> ConstructionResult<()> {
        if !visited.insert(Arc::as_ptr(recipe).cast::<()>()) {
            return Ok(());
        }
        for name in recipe.referenced_names() {
            if !self.contains(&name) {
                return Err(ConstructionError::no_such_component(name));
            }
        }
        for nested in recipe.dependencies() {
            self.validate_recipe(&nested, visited)?;
        }
        Ok(())
    }

    /// 创建单个组件
    pub fn create(&mut self, name: &str) -> ConstructionResult<Value> {
        let mut values = self.create_all(&[name.to_string()])?;
        values
            .pop()
            .ok_or_else(|| ConstructionError::no_such_component(name))
    }

    /// 在一次执行中创建多个组件，失败时不提交任何新实例
    pub fn create_all(&mut self, names: &[String]) -> ConstructionResult<Vec<Value>> {
        let mut pass = ExecutionPass::new(self);
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            match pass.create(name) {
                Ok(value) => values.push(value),
                Err(e) => {
                    warn!("创建组件 {} 失败，回滚本次执行: {}", name, e);
                    pass.rollback();
                    return Err(e);
                }
            }
        }
        pass.commit();
        Ok(values)
    }

    /// 逆序销毁所有实例并清空仓库
    pub fn destroy(&mut self) {
        let entries = std::mem::take(&mut self.destroy_list);
        info!("销毁仓库中的 {} 个实例", entries.len());
        for entry in entries.into_iter().rev() {
            debug!("销毁组件: {}", entry.name);
            entry.run();
        }
        self.slots.clear();
        self.index.clear();
    }

    /// 已登记销毁回调的组件名称，按创建顺序
    pub fn destroy_order(&self) -> Vec<String> {
        self.destroy_list.iter().map(|e| e.name.clone()).collect()
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.index.get(name).map(|&i| &self.slots[i])
    }

    fn push_slot(&mut self, name: String, recipe: Option<Arc<dyn Recipe>>, instance: Option<Value>) {
        self.index.insert(name.clone(), self.slots.len());
        self.slots.push(Slot {
            name,
            recipe,
            instance,
        });
    }
}

impl Default for BlueprintRepository {
    fn default() -> Self {
        Self::new(ContainerDefaults::default())
    }
}

/// 一次构建执行
///
/// 维护正在构建的名称栈和部分对象，新实例先暂存，提交时才写回仓库。
pub struct ExecutionPass<'a> {
    repository: &'a mut BlueprintRepository,
    in_progress: Vec<String>,
    partials: HashMap<String, Value>,
    created: HashMap<String, Value>,
    created_order: Vec<String>,
    destroy_list: Vec<DestroyEntry>,
}

impl<'a> ExecutionPass<'a> {
    /// 开始一次执行
    pub fn new(repository: &'a mut BlueprintRepository) -> Self {
        Self {
            repository,
            in_progress: Vec::new(),
            partials: HashMap::new(),
            created: HashMap::new(),
            created_order: Vec::new(),
            destroy_list: Vec::new(),
        }
    }

    /// 提交本次创建的实例
    pub fn commit(self) {
        let mut created = self.created;
        for name in self.created_order {
            if let Some(value) = created.remove(&name) {
                if let Some(&slot) = self.repository.index.get(&name) {
                    self.repository.slots[slot].instance = Some(value);
                }
            }
        }
        self.repository.destroy_list.extend(self.destroy_list);
    }

    /// 放弃本次执行，逆序销毁已创建的对象
    pub fn rollback(self) {
        for entry in self.destroy_list.into_iter().rev() {
            debug!("回滚销毁组件: {}", entry.name);
            entry.run();
        }
    }

    fn circular(&self, name: &str) -> ConstructionError {
        let start = self
            .in_progress
            .iter()
            .position(|n| n == name)
            .unwrap_or(0);
        let mut chain = self.in_progress[start..].to_vec();
        chain.push(name.to_string());
        ConstructionError::CircularDependency {
            chain: chain.join(" -> "),
        }
    }
}

impl ExecutionContext for ExecutionPass<'_> {
    fn create(&mut self, name: &str) -> ConstructionResult<Value> {
        if let Some(value) = self.repository.get_instance(name) {
            return Ok(value);
        }
        if let Some(value) = self.created.get(name) {
            return Ok(value.clone());
        }
        if self.in_progress.iter().any(|n| n == name) {
            return self
                .partials
                .get(name)
                .cloned()
                .ok_or_else(|| self.circular(name));
        }

        let recipe = self
            .repository
            .get_recipe(name)
            .ok_or_else(|| ConstructionError::no_such_component(name))?;

        self.in_progress.push(name.to_string());
        let result = recipe.create(self);
        self.in_progress.pop();
        self.partials.remove(name);
        let value = result?;

        if !recipe.is_prototype() {
            debug!("组件已创建: {}", name);
            self.created.insert(name.to_string(), value.clone());
            self.created_order.push(name.to_string());
            if recipe.has_destroy() {
                self.destroy_list.push(DestroyEntry {
                    name: name.to_string(),
                    recipe,
                    instance: value.clone(),
                });
            }
        }
        Ok(value)
    }

    fn create_nested(&mut self, recipe: &Arc<dyn Recipe>) -> ConstructionResult<Value> {
        let value = recipe.create(self)?;
        if let Some(name) = recipe.name() {
            self.partials.remove(name);
        }
        if recipe.has_destroy() && !recipe.is_prototype() {
            let name = recipe.name().unwrap_or("<内联>").to_string();
            debug!("登记内联组件的销毁回调: {}", name);
            self.destroy_list.push(DestroyEntry {
                name,
                recipe: recipe.clone(),
                instance: value.clone(),
            });
        }
        Ok(value)
    }

    fn contains(&self, name: &str) -> bool {
        self.repository.contains(name)
    }

    fn add_partial_object(&mut self, name: &str, value: Value) {
        self.partials.insert(name.to_string(), value);
    }

    fn convert(&self, value: Value, target: &TypeRef) -> ConstructionResult<Value> {
        self.repository.converter.convert(value, target)
    }

    fn can_convert(&self, value: &Value, target: &TypeRef) -> bool {
        self.repository.converter.can_convert(value, target)
    }

    fn defaults(&self) -> &ContainerDefaults {
        &self.repository.defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::PassThroughRecipe;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Recorded {
        name: String,
        deps: Vec<String>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recipe for Recorded {
        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }

        fn referenced_names(&self) -> Vec<String> {
            self.deps.clone()
        }

        fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
            for dep in &self.deps {
                ctx.create(dep)?;
            }
            self.log.lock().push(format!("create:{}", self.name));
            Ok(Value::object(self.name.clone(), ()))
        }

        fn has_destroy(&self) -> bool {
            true
        }

        fn destroy(&self, _instance: &Value) {
            self.log.lock().push(format!("destroy:{}", self.name));
        }
    }

    fn recorded(name: &str, deps: &[&str], log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Recipe> {
        Arc::new(Recorded {
            name: name.to_string(),
            deps: deps.iter().map(ToString::to_string).collect(),
            log: log.clone(),
        })
    }

    /// 销毁时 panic 的配方
    #[derive(Debug)]
    struct Exploding {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recipe for Exploding {
        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }

        fn create(&self, _ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
            self.log.lock().push(format!("create:{}", self.name));
            Ok(Value::object(self.name.clone(), ()))
        }

        fn has_destroy(&self) -> bool {
            true
        }

        fn destroy(&self, _instance: &Value) {
            self.log.lock().push(format!("destroy:{}", self.name));
            panic!("{} 销毁失败", self.name);
        }
    }

    #[test]
    fn test_failing_destroy_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut repo = BlueprintRepository::default();
        repo.put_recipe(recorded("a", &[], &log)).unwrap();
        repo.put_recipe(Arc::new(Exploding {
            name: "b".to_string(),
            log: log.clone(),
        }))
        .unwrap();
        repo.put_recipe(recorded("c", &[], &log)).unwrap();

        repo.create_all(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
        repo.destroy();
        assert_eq!(
            *log.lock(),
            vec!["create:a", "create:b", "create:c", "destroy:c", "destroy:b", "destroy:a"]
        );
    }

    #[test]
    fn test_destroy_runs_in_reverse_creation_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut repo = BlueprintRepository::default();
        repo.put_recipe(recorded("c", &["b"], &log)).unwrap();
        repo.put_recipe(recorded("b", &["a"], &log)).unwrap();
        repo.put_recipe(recorded("a", &[], &log)).unwrap();

        repo.create("c").unwrap();
        assert_eq!(repo.destroy_order(), vec!["a", "b", "c"]);

        repo.destroy();
        let log = log.lock();
        assert_eq!(
            *log,
            vec!["create:a", "create:b", "create:c", "destroy:c", "destroy:b", "destroy:a"]
        );
        assert!(repo.names().is_empty());
    }

    #[test]
    fn test_repeated_create_returns_same_instance() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut repo = BlueprintRepository::default();
        repo.put_recipe(recorded("a", &[], &log)).unwrap();

        let first = repo.create("a").unwrap();
        let second = repo.create("a").unwrap();
        assert!(first.same_instance(&second));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_constructor_cycle_is_reported() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut repo = BlueprintRepository::default();
        repo.put_recipe(recorded("a", &["b"], &log)).unwrap();
        repo.put_recipe(recorded("b", &["a"], &log)).unwrap();

        let error = repo.create("a").unwrap_err();
        match error {
            ConstructionError::CircularDependency { chain } => assert_eq!(chain, "a -> b -> a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failed_pass_destroys_created_objects() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut repo = BlueprintRepository::default();
        repo.put_recipe(recorded("a", &[], &log)).unwrap();
        repo.put_recipe(recorded("b", &["a", "missing"], &log)).unwrap();

        assert!(repo.create("b").is_err());
        assert!(repo.get_instance("a").is_none());
        assert_eq!(*log.lock(), vec!["create:a", "destroy:a"]);
    }

    #[test]
    fn test_validate_reports_unknown_reference() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut repo = BlueprintRepository::default();
        repo.put_recipe(recorded("a", &["ghost"], &log)).unwrap();
        assert!(matches!(
            repo.validate(),
            Err(ConstructionError::NoSuchComponent { .. })
        ));
    }

    #[test]
    fn test_replaced_instance_is_destroyed_with_the_repository() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut repo = BlueprintRepository::default();
        repo.put_recipe(recorded("a", &[], &log)).unwrap();
        let original = repo.create("a").unwrap();

        repo.add("a", Value::Int(9)).unwrap();
        assert_eq!(repo.get_instance("a"), Some(Value::Int(9)));
        assert!(!original.same_instance(&Value::Int(9)));
        assert_eq!(repo.destroy_order(), vec!["a"]);

        repo.destroy();
        assert_eq!(*log.lock(), vec!["create:a", "destroy:a"]);
    }

    #[test]
    fn test_add_rejects_bound_instance() {
        let mut repo = BlueprintRepository::default();
        repo.add("x", Value::Int(1)).unwrap();
        assert!(matches!(
            repo.add("x", Value::Int(2)),
            Err(ConstructionError::NameAlreadyBound { .. })
        ));

        repo.put_recipe(Arc::new(PassThroughRecipe::new("y", Value::Int(3))))
            .unwrap();
        repo.add("y", Value::Int(4)).unwrap();
        assert_eq!(repo.create("y").unwrap(), Value::Int(4));
    }
}
