//! LDAP 风格过滤器
//!
//! 实现 RFC 1960 形式的过滤器解析与匹配，用于服务查询与作用域共享策略。
//!
//! ```rust
//! use infrastructure_common::{Filter, Properties};
//!
//! let filter = Filter::parse("(&(objectClass=com.foo.Bar)(component.name=x))").unwrap();
//! let props = Properties::new()
//!     .with("objectClass", "com.foo.Bar")
//!     .with("component.name", "x");
//! assert!(filter.matches(&props));
//! ```

use crate::errors::FilterError;
use crate::properties::{Properties, PropertyValue};
use std::fmt;
use std::str::FromStr;

/// 比较操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `=`
    Equal,
    /// `~=`
    Approx,
    /// `>=`
    GreaterEq,
    /// `<=`
    LessEq,
}

/// 解析后的过滤器
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// 与
    And(Vec<Filter>),
    /// 或
    Or(Vec<Filter>),
    /// 非
    Not(Box<Filter>),
    /// 简单比较
    Compare {
        attr: String,
        op: Comparison,
        value: String,
    },
    /// 存在性判断 `(attr=*)`
    Present { attr: String },
    /// 子串匹配 `(attr=a*b*c)`，首尾片段可为空
    Substring { attr: String, parts: Vec<String> },
}

impl Filter {
    /// 解析过滤器字符串
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let mut parser = Parser::new(text);
        parser.skip_whitespace();
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.error("过滤器结尾存在多余字符"));
        }
        Ok(filter)
    }

    /// 创建等值过滤器
    pub fn equal(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Compare {
            attr: attr.into(),
            op: Comparison::Equal,
            value: value.into(),
        }
    }

    /// 对属性集合求值
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Self::And(items) => items.iter().all(|f| f.matches(properties)),
            Self::Or(items) => items.iter().any(|f| f.matches(properties)),
            Self::Not(inner) => !inner.matches(properties),
            Self::Present { attr } => properties.contains_key(attr),
            Self::Compare { attr, op, value } => properties
                .get(attr)
                .is_some_and(|actual| compare(actual, *op, value)),
            Self::Substring { attr, parts } => properties
                .get(attr)
                .is_some_and(|actual| substring(actual, parts)),
        }
    }

    /// 针对单个属性求值
    pub fn matches_attribute(&self, key: &str, value: &str) -> bool {
        self.matches(&Properties::new().with(key, value))
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(items) => {
                f.write_str("(&")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Or(items) => {
                f.write_str("(|")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Not(inner) => write!(f, "(!{inner})"),
            Self::Present { attr } => write!(f, "({attr}=*)"),
            Self::Compare { attr, op, value } => {
                let op = match op {
                    Comparison::Equal => "=",
                    Comparison::Approx => "~=",
                    Comparison::GreaterEq => ">=",
                    Comparison::LessEq => "<=",
                };
                write!(f, "({attr}{op}{})", escape_value(value))
            }
            Self::Substring { attr, parts } => {
                let escaped = parts.iter().map(|p| escape_value(p)).collect::<Vec<_>>();
                write!(f, "({attr}={})", escaped.join("*"))
            }
        }
    }
}

/// 转义过滤器值中的特殊字符
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '*' | '(' | ')') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 构造等值子句 `(attr=value)`
pub fn equality_clause(attr: &str, value: &str) -> String {
    format!("({attr}={})", escape_value(value))
}

/// 把多个子句用 AND 组合
///
/// 单个子句原样返回，空集合视为配置错误。
pub fn combine_and(members: &[String]) -> Result<String, FilterError> {
    match members {
        [] => Err(FilterError::EmptyConstraints {
            message: "服务引用没有指定任何约束".to_string(),
        }),
        [single] => Ok(single.clone()),
        many => Ok(format!("(&{})", many.concat())),
    }
}

fn compare(actual: &PropertyValue, op: Comparison, expected: &str) -> bool {
    match actual {
        PropertyValue::Str(s) => match op {
            Comparison::Equal => s == expected,
            Comparison::Approx => normalize(s) == normalize(expected),
            Comparison::GreaterEq => s.as_str() >= expected,
            Comparison::LessEq => s.as_str() <= expected,
        },
        PropertyValue::Int(i) => match expected.trim().parse::<i64>() {
            Ok(expected) => match op {
                Comparison::Equal | Comparison::Approx => *i == expected,
                Comparison::GreaterEq => *i >= expected,
                Comparison::LessEq => *i <= expected,
            },
            Err(_) => false,
        },
        PropertyValue::Bool(b) => match op {
            Comparison::Equal | Comparison::Approx => expected
                .trim()
                .parse::<bool>()
                .or_else(|_| expected.trim().to_ascii_lowercase().parse::<bool>())
                .is_ok_and(|expected| expected == *b),
            _ => false,
        },
        PropertyValue::List(items) => items.iter().any(|item| compare(item, op, expected)),
    }
}

fn substring(actual: &PropertyValue, parts: &[String]) -> bool {
    match actual {
        PropertyValue::Str(s) => substring_str(s, parts),
        PropertyValue::List(items) => items.iter().any(|item| substring(item, parts)),
        other => substring_str(&other.to_string(), parts),
    }
}

fn substring_str(s: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    let Some(mut remaining) = s.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> FilterError {
        FilterError::syntax(self.text, self.pos, message)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("期望字符 '{expected}'")))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect('(')?;
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("过滤器意外结束")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut items = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('(') {
            items.push(self.parse_filter()?);
            self.skip_whitespace();
        }
        if items.is_empty() {
            return Err(self.error("组合过滤器缺少子过滤器"));
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '<' | '>' | '~' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attr: String = self.chars[start..self.pos].iter().collect();
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(self.error("缺少属性名"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Comparison::Equal
            }
            Some(c @ ('~' | '>' | '<')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '~' => Comparison::Approx,
                    '>' => Comparison::GreaterEq,
                    _ => Comparison::LessEq,
                }
            }
            _ => return Err(self.error("缺少比较操作符")),
        };

        let (parts, has_wildcard) = self.parse_value()?;
        if op != Comparison::Equal || !has_wildcard {
            return Ok(Filter::Compare {
                attr,
                op,
                value: parts.concat(),
            });
        }
        if parts.len() == 2 && parts.iter().all(String::is_empty) {
            return Ok(Filter::Present { attr });
        }
        Ok(Filter::Substring { attr, parts })
    }

    /// 读取值，按未转义的 `*` 切分
    fn parse_value(&mut self) -> Result<(Vec<String>, bool), FilterError> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut has_wildcard = false;
        loop {
            match self.peek() {
                None => return Err(self.error("值没有以 ')' 结束")),
                Some(')') => break,
                Some('(') => return Err(self.error("值中的 '(' 必须转义")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("转义字符后缺少内容"))?;
                    current.push(escaped);
                    self.pos += 1;
                }
                Some('*') => {
                    has_wildcard = true;
                    parts.push(std::mem::take(&mut current));
                    self.pos += 1;
                }
                Some(c) => {
                    current.push(c);
                    self.pos += 1;
                }
            }
        }
        parts.push(current);
        Ok((parts, has_wildcard))
    }
}
