//! 构造方法与工厂方法的参数匹配
//!
//! 先按参数个数筛选候选，再逐个参数打分：可直接赋值记 2 分，需要转换记 1 分，
//! 无法转换则淘汰。总分最高的候选胜出，同分即为歧义。
//! 允许重排时，只有原始顺序全部失败才尝试其他排列。参数不超过
//! [`MAX_PERMUTED_ARGUMENTS`] 个时穷举所有排列，超过时按形参顺序贪心地
//! 为每个形参挑选第一个可赋值（其次可转换）的未用实参。

use crate::converter::is_assignable;
use di_abstractions::{Executable, ExecutionContext, TypeRef, Value};
use infrastructure_common::{ConstructionError, ConstructionResult};

const EXACT: u32 = 2;
const CONVERTIBLE: u32 = 1;

/// 穷举排列的参数个数上限
pub const MAX_PERMUTED_ARGUMENTS: usize = 6;

/// 匹配结果
#[derive(Debug)]
pub struct ArgumentMatch {
    /// 选中的候选下标
    pub index: usize,
    /// 已按形参顺序排列并转换的实参
    pub args: Vec<Value>,
}

#[derive(Debug)]
struct Candidate {
    index: usize,
    order: Vec<usize>,
    score: u32,
}

/// 选择最佳匹配的可调用成员
pub fn select<I>(
    ctx: &dyn ExecutionContext,
    target: &str,
    candidates: &[Executable<I>],
    args: &[Value],
    types: &[Option<TypeRef>],
    reorder: bool,
) -> ConstructionResult<ArgumentMatch> {
    let identity: Vec<usize> = (0..args.len()).collect();
    let mut matches = score_all(ctx, candidates, args, types, std::slice::from_ref(&identity));

    if matches.is_empty() && reorder && args.len() > 1 {
        matches = if args.len() <= MAX_PERMUTED_ARGUMENTS {
            let orders: Vec<Vec<usize>> = permutations(args.len())
                .into_iter()
                .filter(|order| *order != identity)
                .collect();
            score_all(ctx, candidates, args, types, &orders)
        } else {
            score_greedy(ctx, candidates, args, types)
        };
    }

    let Some(best_score) = matches.iter().map(|c| c.score).max() else {
        return Err(no_match(target, candidates, args));
    };
    let mut best: Vec<Candidate> = matches.into_iter().filter(|c| c.score == best_score).collect();

    // 不同排列命中同一个候选不算歧义
    best.dedup_by_key(|c| c.index);
    if best.len() > 1 {
        return Err(ConstructionError::AmbiguousExecutable {
            target: target.to_string(),
            candidates: best
                .iter()
                .map(|c| candidates[c.index].signature())
                .collect(),
        });
    }

    let chosen = best.swap_remove(0);
    let executable = &candidates[chosen.index];
    let mut converted = Vec::with_capacity(args.len());
    for (param, &source) in executable.params.iter().zip(&chosen.order) {
        converted.push(ctx.convert(args[source].clone(), param)?);
    }
    Ok(ArgumentMatch {
        index: chosen.index,
        args: converted,
    })
}

fn score_all<I>(
    ctx: &dyn ExecutionContext,
    candidates: &[Executable<I>],
    args: &[Value],
    types: &[Option<TypeRef>],
    orders: &[Vec<usize>],
) -> Vec<Candidate> {
    let mut matches = Vec::new();
    for (index, executable) in candidates.iter().enumerate() {
        if executable.arity() != args.len() {
            continue;
        }
        for order in orders {
            if let Some(score) = score(ctx, &executable.params, args, types, order) {
                matches.push(Candidate {
                    index,
                    order: order.clone(),
                    score,
                });
            }
        }
    }
    matches
}

fn score_greedy<I>(
    ctx: &dyn ExecutionContext,
    candidates: &[Executable<I>],
    args: &[Value],
    types: &[Option<TypeRef>],
) -> Vec<Candidate> {
    let mut matches = Vec::new();
    for (index, executable) in candidates.iter().enumerate() {
        if executable.arity() != args.len() {
            continue;
        }
        let Some(order) = greedy_order(ctx, &executable.params, args, types) else {
            continue;
        };
        if let Some(score) = score(ctx, &executable.params, args, types, &order) {
            matches.push(Candidate {
                index,
                order,
                score,
            });
        }
    }
    matches
}

/// 为每个形参挑选一个未用的实参，先找可直接赋值的，再找可转换的
fn greedy_order(
    ctx: &dyn ExecutionContext,
    params: &[TypeRef],
    args: &[Value],
    types: &[Option<TypeRef>],
) -> Option<Vec<usize>> {
    let mut used = vec![false; args.len()];
    let mut order = Vec::with_capacity(params.len());
    for param in params {
        let free: Vec<usize> = (0..args.len())
            .filter(|&source| !used[source])
            .filter(|&source| match types.get(source) {
                Some(Some(declared)) => declared == param,
                _ => true,
            })
            .collect();
        let source = free
            .iter()
            .copied()
            .find(|&source| is_assignable(&args[source], param))
            .or_else(|| {
                free.iter()
                    .copied()
                    .find(|&source| ctx.can_convert(&args[source], param))
            })?;
        used[source] = true;
        order.push(source);
    }
    Some(order)
}

fn score(
    ctx: &dyn ExecutionContext,
    params: &[TypeRef],
    args: &[Value],
    types: &[Option<TypeRef>],
    order: &[usize],
) -> Option<u32> {
    let mut total = 0;
    for (param, &source) in params.iter().zip(order) {
        if let Some(Some(declared)) = types.get(source) {
            if declared != param {
                return None;
            }
        }
        let arg = &args[source];
        total += if is_assignable(arg, param) {
            EXACT
        } else if ctx.can_convert(arg, param) {
            CONVERTIBLE
        } else {
            return None;
        };
    }
    Some(total)
}

fn no_match<I>(target: &str, candidates: &[Executable<I>], args: &[Value]) -> ConstructionError {
    let supplied = args.iter().map(Value::type_name).collect::<Vec<_>>();
    let available = candidates
        .iter()
        .map(Executable::signature)
        .collect::<Vec<_>>();
    ConstructionError::NoMatchingExecutable {
        target: target.to_string(),
        detail: format!(
            "实参类型 ({}), 候选 [{}]",
            supplied.join(", "),
            available.join("; ")
        ),
    }
}

/// 生成 `0..n` 的全部排列（字典序）
fn permutations(n: usize) -> Vec<Vec<usize>> {
    let mut current: Vec<usize> = (0..n).collect();
    let mut result = vec![current.clone()];
    loop {
        let Some(i) = (1..n).rev().find(|&i| current[i - 1] < current[i]) else {
            return result;
        };
        let pivot = i - 1;
        let Some(j) = (i..n).rev().find(|&j| current[j] > current[pivot]) else {
            return result;
        };
        current.swap(pivot, j);
        current[i..].reverse();
        result.push(current.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;
    use di_abstractions::{ContainerDefaults, Recipe};
    use std::sync::Arc;

    struct PlainContext {
        defaults: ContainerDefaults,
    }

    impl ExecutionContext for PlainContext {
        fn create(&mut self, name: &str) -> ConstructionResult<Value> {
            Err(ConstructionError::no_such_component(name))
        }

        fn create_nested(&mut self, recipe: &Arc<dyn Recipe>) -> ConstructionResult<Value> {
            recipe.create(self)
        }

        fn contains(&self, _name: &str) -> bool {
            false
        }

        fn add_partial_object(&mut self, _name: &str, _value: Value) {}

        fn convert(&self, value: Value, target: &TypeRef) -> ConstructionResult<Value> {
            Converter::new().convert(value, target)
        }

        fn can_convert(&self, value: &Value, target: &TypeRef) -> bool {
            Converter::new().can_convert(value, target)
        }

        fn defaults(&self) -> &ContainerDefaults {
            &self.defaults
        }
    }

    fn ctx() -> PlainContext {
        PlainContext {
            defaults: ContainerDefaults::default(),
        }
    }

    fn executable(params: &[&str]) -> Executable<()> {
        Executable {
            name: "<init>".to_string(),
            params: params.iter().map(|p| TypeRef::parse(p)).collect(),
            invoker: (),
        }
    }

    #[test]
    fn test_exact_match_beats_conversion() {
        let candidates = vec![executable(&["int"]), executable(&["string"])];
        let chosen = select(&ctx(), "demo", &candidates, &[Value::from("7")], &[None], false).unwrap();
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn test_arity_filters_candidates() {
        let candidates = vec![executable(&["string", "string"]), executable(&["int"])];
        let chosen = select(&ctx(), "demo", &candidates, &[Value::from("7")], &[None], false).unwrap();
        assert_eq!(chosen.index, 1);
        assert_eq!(chosen.args, vec![Value::Int(7)]);
    }

    #[test]
    fn test_equal_scores_are_ambiguous() {
        let candidates = vec![executable(&["int"]), executable(&["float"])];
        let error = select(&ctx(), "demo", &candidates, &[Value::from("7")], &[None], false).unwrap_err();
        assert!(matches!(error, ConstructionError::AmbiguousExecutable { .. }));
    }

    #[test]
    fn test_type_annotation_must_equal_parameter() {
        let candidates = vec![executable(&["int"]), executable(&["float"])];
        let chosen = select(
            &ctx(),
            "demo",
            &candidates,
            &[Value::from("7")],
            &[Some(TypeRef::Float)],
            false,
        )
        .unwrap();
        assert_eq!(chosen.index, 1);
        assert_eq!(chosen.args, vec![Value::Float(7.0)]);
    }

    #[test]
    fn test_reorder_only_when_declared_order_fails() {
        let widget = Value::object("demo.Widget", 0u8);
        let candidates = vec![executable(&["demo.Widget", "int"])];
        let args = [Value::Int(1), widget.clone()];

        let error = select(&ctx(), "demo", &candidates, &args, &[None, None], false).unwrap_err();
        assert!(matches!(error, ConstructionError::NoMatchingExecutable { .. }));

        let chosen = select(&ctx(), "demo", &candidates, &args, &[None, None], true).unwrap();
        assert!(chosen.args[0].same_instance(&widget));
        assert_eq!(chosen.args[1], Value::Int(1));
    }

    #[test]
    fn test_reorder_beyond_permutation_limit_matches_greedily() {
        let widget = Value::object("demo.Widget", 0u8);
        let mut params = vec!["demo.Widget"];
        params.extend(std::iter::repeat("int").take(11));
        let candidates = vec![executable(&params)];
        let mut args: Vec<Value> = (0..11).map(Value::Int).collect();
        args.push(widget.clone());
        let types = vec![None; args.len()];
        assert!(args.len() > MAX_PERMUTED_ARGUMENTS);

        let chosen = select(&ctx(), "demo", &candidates, &args, &types, true).unwrap();
        assert!(chosen.args[0].same_instance(&widget));
        assert_eq!(&chosen.args[1..], &(0..11).map(Value::Int).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_permutations_cover_all_orders() {
        let orders = permutations(3);
        assert_eq!(orders.len(), 6);
        assert_eq!(orders[0], vec![0, 1, 2]);
        assert_eq!(orders[5], vec![2, 1, 0]);
    }
}
