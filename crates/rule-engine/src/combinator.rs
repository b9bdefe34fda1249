//! 规则组合器
//!
//! 用显式的逻辑操作符把多条规则文本连接成一条新规则。每条规则在连接前
//! 都会被括号包裹，组合结果等价于先分别求值再从左到右折叠。

use crate::compiler::compile_with_limits;
use crate::error::{Result, RuleError};
use crate::operators::LogicalOperator;
use crate::parser::ParseLimits;

/// 使用默认限制组合规则
///
/// `parts` 中每一项是 (规则文本, 与下一项之间的操作符)，最后一项的操作符被忽略。
pub fn combine<S: AsRef<str>>(parts: &[(S, Option<LogicalOperator>)]) -> Result<String> {
    combine_with_limits(parts, &ParseLimits::default())
}

/// 按指定限制组合规则
pub fn combine_with_limits<S: AsRef<str>>(
    parts: &[(S, Option<LogicalOperator>)],
    limits: &ParseLimits,
) -> Result<String> {
    if parts.is_empty() {
        return Err(RuleError::Combine("至少需要一条规则".to_string()));
    }

    let last = parts.len() - 1;
    let mut combined = String::new();

    for (i, (rule_string, operator)) in parts.iter().enumerate() {
        let rule_string = rule_string.as_ref();

        // 单条规则本身不合法时直接返回其错误
        compile_with_limits(rule_string, limits)?;

        combined.push('(');
        combined.push_str(rule_string.trim());
        combined.push(')');

        if i < last {
            let operator = operator.ok_or_else(|| {
                RuleError::Combine(format!("第 {} 条规则缺少与下一条规则之间的逻辑操作符", i + 1))
            })?;
            combined.push(' ');
            combined.push_str(&operator.to_string());
            combined.push(' ');
        }
    }

    compile_with_limits(&combined, limits)?;

    Ok(combined)
}
