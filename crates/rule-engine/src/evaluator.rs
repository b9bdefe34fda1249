//! 条件评估器
//!
//! 对单个比较条件应用类型感知的比较语义，并提供对整棵语法树的纯函数求值。
//!
//! 失败即拒绝：字段缺失、类型不兼容、操作符与类型不匹配时条件结果为 `false`，
//! 不会抛出错误，单个字段的数据问题不会中断整棵树的评估。

use crate::models::{Literal, RuleNode};
use crate::operators::ComparisonOperator;
use crate::record::{FieldValue, Record};

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估比较条件
    ///
    /// # Arguments
    /// * `field_value` - 从记录中获取的字段值
    /// * `operator` - 比较操作符
    /// * `literal` - 规则中定义的字面量
    pub fn evaluate(
        field_value: Option<&FieldValue>,
        operator: ComparisonOperator,
        literal: &Literal,
    ) -> bool {
        // 字段缺失或为 null 时对任何操作符都不成立，包括 !=
        let field_value = match field_value {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match literal {
            Literal::Text(expected) => Self::compare_text(field_value, operator, expected),
            Literal::Number(expected) => match field_value.as_number() {
                Some(actual) => Self::compare_numbers(actual, operator, *expected),
                // 无法转换为数值时，相等类比较退化为字符串比较，顺序比较不成立
                None => Self::compare_text(field_value, operator, &literal.to_string()),
            },
        }
    }

    /// 文本比较：只支持 = 和 !=，比较字段值的字符串表示，区分大小写
    fn compare_text(field: &FieldValue, operator: ComparisonOperator, expected: &str) -> bool {
        match operator {
            ComparisonOperator::Eq => field.to_string() == expected,
            ComparisonOperator::Neq => field.to_string() != expected,
            ComparisonOperator::Gt
            | ComparisonOperator::Lt
            | ComparisonOperator::Gte
            | ComparisonOperator::Lte => false,
        }
    }

    /// 数值比较
    fn compare_numbers(actual: f64, operator: ComparisonOperator, expected: f64) -> bool {
        match operator {
            ComparisonOperator::Gt => actual > expected,
            ComparisonOperator::Lt => actual < expected,
            ComparisonOperator::Gte => actual >= expected,
            ComparisonOperator::Lte => actual <= expected,
            // 精确比较，与顺序比较保持一致
            ComparisonOperator::Eq => actual == expected,
            ComparisonOperator::Neq => actual != expected,
        }
    }
}

/// 对语法树求值
///
/// 纯函数：不读时钟、不产生随机数、不做 I/O，同一 (语法树, 记录) 结果恒定。
/// 逻辑节点的左右子树总是都会求值，不做短路。
pub fn evaluate(node: &RuleNode, record: &Record) -> bool {
    match node {
        RuleNode::Comparison {
            field,
            operator,
            value,
        } => ConditionEvaluator::evaluate(record.get_field(field), *operator, value),
        RuleNode::Logical {
            operator,
            left,
            right,
        } => {
            let left = evaluate(left, record);
            let right = evaluate(right, record);
            operator.apply(left, right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(field: Option<FieldValue>, op: ComparisonOperator, literal: Literal) -> bool {
        ConditionEvaluator::evaluate(field.as_ref(), op, &literal)
    }

    fn num(n: f64) -> Literal {
        Literal::Number(n)
    }

    fn text(s: &str) -> Literal {
        Literal::Text(s.to_string())
    }

    #[test]
    fn test_numeric_comparisons() {
        let v = Some(FieldValue::Number(100.0));
        assert!(eval(v.clone(), ComparisonOperator::Gt, num(50.0)));
        assert!(eval(v.clone(), ComparisonOperator::Gte, num(100.0)));
        assert!(eval(v.clone(), ComparisonOperator::Lte, num(100.0)));
        assert!(!eval(v.clone(), ComparisonOperator::Lt, num(100.0)));
        assert!(eval(v.clone(), ComparisonOperator::Eq, num(100.0)));
        assert!(eval(v, ComparisonOperator::Neq, num(99.5)));
    }

    #[test]
    fn test_numeric_equality_is_exact() {
        let v = Some(FieldValue::Number(0.0));
        let tiny = 0.0000000000000001;

        assert!(!eval(v.clone(), ComparisonOperator::Eq, num(tiny)));
        assert!(eval(v.clone(), ComparisonOperator::Neq, num(tiny)));
        assert!(eval(v, ComparisonOperator::Lt, num(tiny)));

        assert!(eval(
            Some(FieldValue::Number(100.0)),
            ComparisonOperator::Eq,
            num(100.0)
        ));
    }

    #[test]
    fn test_numeric_string_coerces() {
        let v = Some(FieldValue::from("35"));
        assert!(eval(v.clone(), ComparisonOperator::Gt, num(30.0)));
        assert!(eval(v, ComparisonOperator::Eq, num(35.0)));
    }

    #[test]
    fn test_non_numeric_value_against_number() {
        let v = Some(FieldValue::from("abc"));
        assert!(!eval(v.clone(), ComparisonOperator::Gt, num(30.0)));
        assert!(!eval(v.clone(), ComparisonOperator::Lte, num(30.0)));
        assert!(!eval(v.clone(), ComparisonOperator::Eq, num(30.0)));
        assert!(eval(v, ComparisonOperator::Neq, num(30.0)));

        let b = Some(FieldValue::Boolean(true));
        assert!(!eval(b.clone(), ComparisonOperator::Gt, num(0.0)));
        assert!(eval(b, ComparisonOperator::Neq, num(1.0)));
    }

    #[test]
    fn test_text_equality_case_sensitive() {
        let v = Some(FieldValue::from("Sales"));
        assert!(eval(v.clone(), ComparisonOperator::Eq, text("Sales")));
        assert!(!eval(v.clone(), ComparisonOperator::Eq, text("sales")));
        assert!(eval(v, ComparisonOperator::Neq, text("sales")));
    }

    #[test]
    fn test_text_literal_uses_string_representation() {
        assert!(eval(
            Some(FieldValue::Number(30.0)),
            ComparisonOperator::Eq,
            text("30")
        ));
        assert!(eval(
            Some(FieldValue::Boolean(true)),
            ComparisonOperator::Eq,
            text("true")
        ));
    }

    #[test]
    fn test_text_literal_ordering_is_false() {
        let v = Some(FieldValue::from("b"));
        assert!(!eval(v.clone(), ComparisonOperator::Gt, text("a")));
        assert!(!eval(v.clone(), ComparisonOperator::Lt, text("c")));
        assert!(!eval(v.clone(), ComparisonOperator::Gte, text("b")));
        assert!(!eval(v, ComparisonOperator::Lte, text("b")));
    }

    #[test]
    fn test_missing_field_fails_closed() {
        for op in [
            ComparisonOperator::Gt,
            ComparisonOperator::Lt,
            ComparisonOperator::Gte,
            ComparisonOperator::Lte,
            ComparisonOperator::Eq,
            ComparisonOperator::Neq,
        ] {
            assert!(!eval(None, op, num(1.0)));
            assert!(!eval(None, op, text("x")));
            assert!(!eval(Some(FieldValue::Null), op, num(1.0)));
            assert!(!eval(Some(FieldValue::Null), op, text("x")));
        }
    }

    #[test]
    fn test_evaluate_tree_without_short_circuit() {
        let tree = RuleNode::or(
            RuleNode::comparison("a", ComparisonOperator::Eq, 1),
            RuleNode::comparison("b", ComparisonOperator::Eq, 2),
        );

        assert!(evaluate(&tree, &Record::new().with("a", 1)));
        assert!(evaluate(&tree, &Record::new().with("b", 2)));
        assert!(!evaluate(&tree, &Record::new().with("a", 2).with("b", 1)));

        let tree = RuleNode::and(
            RuleNode::comparison("a", ComparisonOperator::Eq, 1),
            RuleNode::comparison("b", ComparisonOperator::Eq, 2),
        );
        assert!(evaluate(&tree, &Record::new().with("a", 1).with("b", 2)));
        assert!(!evaluate(&tree, &Record::new().with("a", 1)));
    }
}
