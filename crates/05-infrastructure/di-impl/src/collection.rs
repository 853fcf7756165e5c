//! 托管服务集合
//!
//! 当前绑定的服务分发器的只读视图。成员变化只由跟踪器驱动，
//! 集合本身没有公开的修改方法。成员表采用写时复制：
//! 迭代器持有创建时的快照，不会观察到修改到一半的结构。

use crate::dispatcher::ServiceDispatcher;
use crate::proxy::ServiceProxy;
use di_abstractions::{
    MemberType, ObjectRef, ReferenceOrdering, ServiceReference, Value,
};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;

/// 集合成员
#[derive(Debug, Clone)]
pub struct Member {
    reference: ServiceReference,
    dispatcher: Arc<ServiceDispatcher>,
}

impl Member {
    pub(crate) fn new(dispatcher: Arc<ServiceDispatcher>) -> Self {
        Self {
            reference: dispatcher.reference().clone(),
            dispatcher,
        }
    }

    /// 服务引用
    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }

    /// 分发器
    pub fn dispatcher(&self) -> &Arc<ServiceDispatcher> {
        &self.dispatcher
    }
}

/// 托管服务集合
pub struct ManagedCollection {
    members: RwLock<Arc<Vec<Member>>>,
    ordering: ReferenceOrdering,
    member_type: MemberType,
    interfaces: Vec<String>,
    filter: String,
}

impl ManagedCollection {
    pub(crate) fn new(
        ordering: ReferenceOrdering,
        member_type: MemberType,
        interfaces: Vec<String>,
        filter: String,
    ) -> Self {
        Self {
            members: RwLock::new(Arc::new(Vec::new())),
            ordering,
            member_type,
            interfaces,
            filter,
        }
    }

    /// 成员数量
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// 成员类型
    pub fn member_type(&self) -> MemberType {
        self.member_type
    }

    /// 当前成员快照
    pub fn snapshot(&self) -> Arc<Vec<Member>> {
        self.members.read().clone()
    }

    /// 当前的服务引用
    pub fn references(&self) -> Vec<ServiceReference> {
        self.snapshot().iter().map(|m| m.reference.clone()).collect()
    }

    /// 按下标取成员值
    pub fn get(&self, index: usize) -> Option<Value> {
        self.snapshot().get(index).map(|m| self.member_value(m))
    }

    /// 迭代成员值
    ///
    /// 成员类型为服务对象时元素是代理，否则是服务引用。
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            collection: self,
            snapshot: self.snapshot(),
            position: 0,
        }
    }

    /// 取出所有能转换为 `Arc<T>` 的服务对象
    pub fn services<T>(&self) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.snapshot()
            .iter()
            .filter_map(|m| m.dispatcher.service())
            .filter_map(|v| v.downcast_shared::<T>())
            .collect()
    }

    fn member_value(&self, member: &Member) -> Value {
        match self.member_type {
            MemberType::ServiceObject => {
                let proxy = ServiceProxy::member(
                    member.dispatcher.clone(),
                    self.type_name(),
                    self.filter.clone(),
                );
                Value::Object(
                    ObjectRef::new(self.type_name(), Arc::new(proxy))
                        .with_interfaces(self.interfaces.clone()),
                )
            }
            MemberType::ServiceReference => {
                Value::object("ServiceReference", member.reference.clone())
            }
        }
    }

    fn type_name(&self) -> String {
        self.interfaces
            .first()
            .cloned()
            .unwrap_or_else(|| "ServiceProxy".to_string())
    }

    /// 是否包含该服务
    pub(crate) fn contains(&self, service_id: u64) -> bool {
        self.members
            .read()
            .iter()
            .any(|m| m.reference.id() == service_id)
    }

    /// 按排序规则插入
    pub(crate) fn insert(&self, member: Member) {
        let mut guard = self.members.write();
        let mut members = guard.as_ref().clone();
        let position = match &self.ordering {
            ReferenceOrdering::Unordered => members.len(),
            ReferenceOrdering::Natural => members
                .iter()
                .position(|m| member.reference > m.reference)
                .unwrap_or(members.len()),
            ReferenceOrdering::Custom(compare) => members
                .iter()
                .position(|m| compare(&member.reference, &m.reference) == Ordering::Less)
                .unwrap_or(members.len()),
        };
        members.insert(position, member);
        *guard = Arc::new(members);
    }

    /// 更新已有成员的引用（属性变化后重新排序）
    pub(crate) fn update(&self, reference: ServiceReference) {
        let Some(existing) = self.remove(reference.id()) else {
            return;
        };
        self.insert(Member {
            reference,
            dispatcher: existing.dispatcher,
        });
    }

    /// 移除成员
    pub(crate) fn remove(&self, service_id: u64) -> Option<Member> {
        let mut guard = self.members.write();
        let position = guard.iter().position(|m| m.reference.id() == service_id)?;
        let mut members = guard.as_ref().clone();
        let removed = members.remove(position);
        *guard = Arc::new(members);
        Some(removed)
    }

    /// 清空并返回所有成员
    pub(crate) fn drain(&self) -> Vec<Member> {
        let mut guard = self.members.write();
        let members = std::mem::replace(&mut *guard, Arc::new(Vec::new()));
        Arc::try_unwrap(members).unwrap_or_else(|shared| shared.as_ref().clone())
    }
}

impl std::fmt::Debug for ManagedCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedCollection")
            .field("filter", &self.filter)
            .field("ordering", &self.ordering)
            .field("member_type", &self.member_type)
            .field("members", &self.references())
            .finish()
    }
}

impl<'a> IntoIterator for &'a ManagedCollection {
    type Item = Value;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 快照迭代器
pub struct Iter<'a> {
    collection: &'a ManagedCollection,
    snapshot: Arc<Vec<Member>>,
    position: usize,
}

impl Iterator for Iter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        let member = self.snapshot.get(self.position)?;
        self.position += 1;
        Some(self.collection.member_value(member))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.snapshot.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryServiceRegistry;
    use di_abstractions::ServiceRegistry;
    use infrastructure_common::{Properties, SERVICE_RANKING};

    fn member(registry: &Arc<InMemoryServiceRegistry>, ranking: i64) -> Member {
        let reference = registry
            .register(
                vec!["a.B".into()],
                Value::Int(ranking),
                Properties::new().with(SERVICE_RANKING, ranking),
            )
            .unwrap();
        Member::new(Arc::new(ServiceDispatcher::new(registry.clone(), reference)))
    }

    fn rankings(collection: &ManagedCollection) -> Vec<i64> {
        collection.references().iter().map(ServiceReference::ranking).collect()
    }

    #[test]
    fn test_natural_ordering_keeps_best_first() {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let collection = ManagedCollection::new(
            ReferenceOrdering::Natural,
            MemberType::ServiceReference,
            vec!["a.B".into()],
            "(objectClass=a.B)".into(),
        );
        collection.insert(member(&registry, 1));
        collection.insert(member(&registry, 5));
        collection.insert(member(&registry, 3));
        assert_eq!(rankings(&collection), vec![5, 3, 1]);
    }

    #[test]
    fn test_custom_ordering() {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let collection = ManagedCollection::new(
            ReferenceOrdering::Custom(Arc::new(|a, b| a.ranking().cmp(&b.ranking()))),
            MemberType::ServiceReference,
            vec!["a.B".into()],
            "(objectClass=a.B)".into(),
        );
        collection.insert(member(&registry, 4));
        collection.insert(member(&registry, 2));
        collection.insert(member(&registry, 9));
        assert_eq!(rankings(&collection), vec![2, 4, 9]);
    }

    #[test]
    fn test_iterator_is_a_snapshot() {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let collection = ManagedCollection::new(
            ReferenceOrdering::Unordered,
            MemberType::ServiceObject,
            vec!["a.B".into()],
            "(objectClass=a.B)".into(),
        );
        let first = member(&registry, 0);
        let first_id = first.reference().id();
        collection.insert(first);

        let mut iter = collection.iter();
        collection.insert(member(&registry, 0));
        collection.remove(first_id);

        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert_eq!(collection.len(), 1);
    }
}
