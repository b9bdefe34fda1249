//! 规则执行器
//!
//! 对编译后的规则求值，返回资格判定、命中的条件和可选的评估追踪。
//! 逻辑节点的两侧总是都会求值，因此命中条件列表不依赖求值顺序。

use crate::compiler::CompiledRule;
use crate::evaluator::ConditionEvaluator;
use crate::models::{EvaluationResult, Literal, RuleNode};
use crate::operators::ComparisonOperator;
use crate::record::Record;
use std::time::Instant;

/// 规则执行器
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    /// 执行规则评估
    ///
    /// 评估不会失败：数据形态问题在条件级别按不成立处理。
    pub fn execute(&self, rule: &CompiledRule, record: &Record) -> EvaluationResult {
        let start = Instant::now();

        let mut result = EvaluationResult::new(rule.id().to_string());
        let path = self.trace_enabled.then_some("root");
        result.eligible = self.evaluate_node(rule.root(), record, &mut result, path);
        result.evaluation_time_us = start.elapsed().as_micros() as u64;

        result
    }

    /// `path` 只在启用追踪时存在
    fn evaluate_node(
        &self,
        node: &RuleNode,
        record: &Record,
        result: &mut EvaluationResult,
        path: Option<&str>,
    ) -> bool {
        match node {
            RuleNode::Comparison {
                field,
                operator,
                value,
            } => self.evaluate_condition(field, *operator, value, record, result, path),
            RuleNode::Logical {
                operator,
                left,
                right,
            } => {
                let left_path = path.map(|p| format!("{}.left", p));
                let right_path = path.map(|p| format!("{}.right", p));
                let left = self.evaluate_node(left, record, result, left_path.as_deref());
                let right = self.evaluate_node(right, record, result, right_path.as_deref());
                let matched = operator.apply(left, right);

                if let Some(path) = path {
                    result.evaluation_trace.push(format!(
                        "{}: {} {} {} => {}",
                        path,
                        left,
                        operator,
                        right,
                        outcome(matched)
                    ));
                }

                matched
            }
        }
    }

    fn evaluate_condition(
        &self,
        field: &str,
        operator: ComparisonOperator,
        value: &Literal,
        record: &Record,
        result: &mut EvaluationResult,
        path: Option<&str>,
    ) -> bool {
        let field_value = record.get_field(field);
        let matched = ConditionEvaluator::evaluate(field_value, operator, value);

        if let Some(path) = path {
            let actual = field_value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "<缺失>".to_string());
            result.evaluation_trace.push(format!(
                "{}: {} {} {} (实际值 {}) => {}",
                path,
                field,
                operator,
                value,
                actual,
                outcome(matched)
            ));
        }

        if matched {
            result
                .matched_conditions
                .push(format!("{} {} {}", field, operator, value));
        }

        matched
    }
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome(matched: bool) -> &'static str {
    if matched { "MATCHED" } else { "NOT_MATCHED" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleCompiler;
    use crate::models::Rule;

    fn compile_rule(rule_string: &str) -> CompiledRule {
        let mut compiler = RuleCompiler::new();
        compiler.compile(Rule::new(rule_string, "")).unwrap()
    }

    fn employee() -> Record {
        Record::new()
            .with("age", 35)
            .with("department", "Sales")
            .with("level", 2)
    }

    #[test]
    fn test_simple_condition_match() {
        let rule = compile_rule("age > 30");
        let result = RuleExecutor::new().execute(&rule, &employee());

        assert!(result.eligible);
        assert_eq!(result.rule_id, rule.id());
        assert_eq!(result.matched_conditions, vec!["age > 30"]);
        assert!(result.evaluation_trace.is_empty());
    }

    #[test]
    fn test_simple_condition_not_match() {
        let rule = compile_rule("department = 'Marketing'");
        let result = RuleExecutor::new().execute(&rule, &employee());

        assert!(!result.eligible);
        assert!(result.matched_conditions.is_empty());
    }

    #[test]
    fn test_both_sides_evaluated() {
        // 左侧已不成立，右侧仍然会被求值并记录
        let rule = compile_rule("age < 30 AND department = 'Sales'");
        let result = RuleExecutor::new().with_trace().execute(&rule, &employee());

        assert!(!result.eligible);
        assert_eq!(result.matched_conditions, vec!["department = 'Sales'"]);
        assert!(
            result
                .evaluation_trace
                .iter()
                .any(|t| t.starts_with("root.right:"))
        );
    }

    #[test]
    fn test_or_collects_all_matches() {
        let rule = compile_rule("age > 30 OR department = 'Sales'");
        let result = RuleExecutor::new().execute(&rule, &employee());

        assert!(result.eligible);
        assert_eq!(result.matched_conditions.len(), 2);
    }

    #[test]
    fn test_nested_groups() {
        let rule = compile_rule("age > 30 AND (department = 'Marketing' OR level >= 2)");
        let result = RuleExecutor::new().with_trace().execute(&rule, &employee());

        assert!(result.eligible);
        assert_eq!(result.matched_conditions, vec!["age > 30", "level >= 2"]);
        assert!(
            result
                .evaluation_trace
                .iter()
                .any(|t| t.starts_with("root.right.left:") && t.ends_with("NOT_MATCHED"))
        );
        assert!(result.evaluation_trace.last().unwrap().starts_with("root:"));
    }

    #[test]
    fn test_trace_shows_missing_field() {
        let rule = compile_rule("bonus > 100");
        let result = RuleExecutor::new().with_trace().execute(&rule, &employee());

        assert!(!result.eligible);
        assert_eq!(result.evaluation_trace.len(), 1);
        assert!(result.evaluation_trace[0].contains("<缺失>"));
    }

    #[test]
    fn test_long_chain_without_trace() {
        let rule_string = (0..1000)
            .map(|i| format!("f{} >= {}", i, i))
            .collect::<Vec<_>>()
            .join(" AND ");
        let rule = compile_rule(&rule_string);
        let record: Record = (0..1000).map(|i| (format!("f{}", i), i as f64)).collect();

        let result = RuleExecutor::new().execute(&rule, &record);
        assert!(result.eligible);
        assert_eq!(result.matched_conditions.len(), 1000);
        assert!(result.evaluation_trace.is_empty());

        let traced = RuleExecutor::new().with_trace().execute(&rule, &record);
        assert_eq!(traced.evaluation_trace.len(), 1999);
        assert!(traced.evaluation_trace[0].starts_with(&format!("root{}:", ".left".repeat(999))));
    }

    #[test]
    fn test_agrees_with_pure_evaluate() {
        let rule = compile_rule("age >= 35 AND level != 3 OR department = 'HR'");
        let record = employee();
        let result = RuleExecutor::new().execute(&rule, &record);

        assert_eq!(result.eligible, crate::evaluator::evaluate(rule.root(), &record));
    }
}
