//! 服务属性与属性值定义
//!
//! 服务注册表、共享策略与过滤器匹配都基于这里的属性模型。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 服务接口名属性
pub const OBJECT_CLASS: &str = "objectClass";
/// 服务 ID 属性
pub const SERVICE_ID: &str = "service.id";
/// 服务排名属性
pub const SERVICE_RANKING: &str = "service.ranking";
/// 组件名称属性
pub const COMPONENT_NAME: &str = "component.name";
/// 包共享命名空间
pub const PACKAGE_NAMESPACE: &str = "osgi.wiring.package";
/// 服务共享命名空间
pub const SERVICE_NAMESPACE: &str = "scope.share.service";

/// 属性值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// 布尔值
    Bool(bool),
    /// 整数值
    Int(i64),
    /// 字符串值
    Str(String),
    /// 多值属性
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// 获取字符串值
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 获取整数值
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 展开为字符串列表（单值视为单元素列表）
    pub fn to_string_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                let joined = items.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values.into_iter().map(Self::Str).collect())
    }
}

/// 属性集合
///
/// 键查找不区分大小写，与 OSGi 服务属性语义一致。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    entries: BTreeMap<String, PropertyValue>,
}

impl Properties {
    /// 创建空属性集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加属性
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 插入属性，替换大小写不同的同名键
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        if let Some(existing) = self.find_key(&key).map(str::to_string) {
            self.entries.remove(&existing);
        }
        self.entries.insert(key, value.into());
    }

    /// 获取属性
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key).or_else(|| {
            self.entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// 移除属性
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        let existing = self.find_key(key)?.to_string();
        self.entries.remove(&existing)
    }

    /// 是否包含属性
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 遍历属性
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.entries.iter()
    }

    /// 属性数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 合并另一个属性集合，已有键被覆盖
    pub fn extend(&mut self, other: &Properties) {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }

    /// 服务排名，缺省为 0
    pub fn ranking(&self) -> i64 {
        self.get(SERVICE_RANKING)
            .and_then(PropertyValue::as_int)
            .unwrap_or(0)
    }

    /// 服务接口名列表
    pub fn object_classes(&self) -> Vec<String> {
        self.get(OBJECT_CLASS)
            .map(PropertyValue::to_string_list)
            .unwrap_or_default()
    }

    fn find_key<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if self.entries.contains_key(key) {
            return Some(key);
        }
        self.entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = Self::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}
