//! 值类型转换
//!
//! 区分"可直接赋值"与"需要转换"两种情况，参数匹配据此打分。

use di_abstractions::{TypeRef, Value};
use infrastructure_common::{BoxError, ConstructionError, ConstructionResult};

/// 值是否可以不经转换直接赋给目标类型
pub fn is_assignable(value: &Value, target: &TypeRef) -> bool {
    match (value, target) {
        (_, TypeRef::Any) => true,
        (Value::Null, TypeRef::Bool | TypeRef::Int | TypeRef::Float) => false,
        (Value::Null, _) => true,
        (Value::Bool(_), TypeRef::Bool)
        | (Value::Int(_), TypeRef::Int)
        | (Value::Float(_), TypeRef::Float)
        | (Value::Str(_), TypeRef::Str)
        | (Value::List(_), TypeRef::List)
        | (Value::Set(_), TypeRef::Set)
        | (Value::Map(_), TypeRef::Map) => true,
        (Value::Object(object), TypeRef::Class(name)) => object.is_instance_of(name),
        _ => false,
    }
}

/// 默认转换器
#[derive(Debug, Clone, Copy, Default)]
pub struct Converter;

impl Converter {
    /// 创建转换器
    pub fn new() -> Self {
        Self
    }

    /// 值是否可以转换为目标类型
    pub fn can_convert(&self, value: &Value, target: &TypeRef) -> bool {
        is_assignable(value, target) || self.try_convert(value, target).is_ok()
    }

    /// 转换值
    pub fn convert(&self, value: Value, target: &TypeRef) -> ConstructionResult<Value> {
        if is_assignable(&value, target) {
            return Ok(value);
        }
        self.try_convert(&value, target)
            .map_err(|source| ConstructionError::Conversion {
                value: value.to_string(),
                target_type: target.to_string(),
                source,
            })
    }

    fn try_convert(&self, value: &Value, target: &TypeRef) -> Result<Value, BoxError> {
        match (value, target) {
            (Value::Str(s), TypeRef::Bool) => parse_bool(s).map(Value::Bool),
            (Value::Str(s), TypeRef::Int) => Ok(Value::Int(s.trim().parse::<i64>()?)),
            (Value::Str(s), TypeRef::Float) => Ok(Value::Float(s.trim().parse::<f64>()?)),
            #[allow(clippy::cast_precision_loss)]
            (Value::Int(i), TypeRef::Float) => Ok(Value::Float(*i as f64)),
            (Value::Bool(_) | Value::Int(_) | Value::Float(_), TypeRef::Str) => {
                Ok(Value::Str(value.to_string()))
            }
            (Value::List(items), TypeRef::Set) => Ok(Value::Set(dedup(items.clone()))),
            (Value::Set(items), TypeRef::List) => Ok(Value::List(items.clone())),
            _ => Err(format!("不支持从 {} 转换到 {}", value.type_name(), target).into()),
        }
    }
}

fn parse_bool(text: &str) -> Result<bool, BoxError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        other => Err(format!("无效的布尔值: {other}").into()),
    }
}

/// 去除重复元素，保持首次出现的顺序
pub fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|existing| existing.same_instance(&item)) {
            unique.push(item);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_conversions() {
        let converter = Converter::new();
        assert_eq!(
            converter.convert(Value::from("42"), &TypeRef::Int).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            converter.convert(Value::from("TRUE"), &TypeRef::Bool).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            converter.convert(Value::Int(3), &TypeRef::Float).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn test_conversion_failure_wraps_source() {
        let error = Converter::new()
            .convert(Value::from("abc"), &TypeRef::Int)
            .unwrap_err();
        assert!(matches!(error, ConstructionError::Conversion { .. }));
    }

    #[test]
    fn test_assignability_is_stricter_than_conversion() {
        let converter = Converter::new();
        let text = Value::from("1");
        assert!(!is_assignable(&text, &TypeRef::Int));
        assert!(converter.can_convert(&text, &TypeRef::Int));
        assert!(!is_assignable(&Value::Null, &TypeRef::Int));
        assert!(is_assignable(&Value::Null, &TypeRef::Class("a.B".into())));
    }

    #[test]
    fn test_list_to_set_removes_duplicates() {
        let list = Value::List(vec![Value::Int(1), Value::Int(1), Value::Int(2)]);
        let set = Converter::new().convert(list, &TypeRef::Set).unwrap();
        assert_eq!(set, Value::Set(vec![Value::Int(1), Value::Int(2)]));
    }
}
