//! 规则编译器
//!
//! 将规则文本编译成内存中的语法树，或还原持久化的语法树缓存，并预提取字段集合。

use crate::error::{Result, RuleError};
use crate::lexer::tokenize;
use crate::models::{Literal, Rule, RuleNode, from_persisted_json};
use crate::parser::{ParseLimits, parse_with_limits};
use std::collections::HashSet;

/// 使用默认限制编译规则文本
pub fn compile(rule_string: &str) -> Result<RuleNode> {
    compile_with_limits(rule_string, &ParseLimits::default())
}

/// 按指定限制编译规则文本
pub fn compile_with_limits(rule_string: &str, limits: &ParseLimits) -> Result<RuleNode> {
    let tokens = tokenize(rule_string)?;
    Ok(parse_with_limits(&tokens, limits)?)
}

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// 规则元数据（不含语法树缓存）
    pub rule: Rule,
    /// 语法树根节点
    pub root: RuleNode,
    /// 规则中引用的所有字段
    pub required_fields: HashSet<String>,
    /// 编译版本号（用于缓存失效）
    pub compile_version: u64,
}

impl CompiledRule {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn rule_string(&self) -> &str {
        &self.rule.rule_string
    }

    pub fn root(&self) -> &RuleNode {
        &self.root
    }

    /// 带语法树缓存的持久化形式
    pub fn to_rule(&self) -> Rule {
        Rule {
            ast: Some(self.root.clone()),
            ..self.rule.clone()
        }
    }
}

/// 规则编译器
pub struct RuleCompiler {
    limits: ParseLimits,
    compile_version: u64,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self::with_limits(ParseLimits::default())
    }

    pub fn with_limits(limits: ParseLimits) -> Self {
        Self {
            limits,
            compile_version: 0,
        }
    }

    pub fn limits(&self) -> &ParseLimits {
        &self.limits
    }

    /// 编译规则文本
    pub fn compile_str(&self, rule_string: &str) -> Result<RuleNode> {
        compile_with_limits(rule_string, &self.limits)
    }

    /// 从持久化 JSON 编译规则
    pub fn compile_from_json(&mut self, json: &str) -> Result<CompiledRule> {
        let rule: Rule = from_persisted_json(json)?;
        self.compile(rule)
    }

    /// 编译规则
    ///
    /// 规则带有语法树缓存时直接还原（校验后），否则解析 `rule_string`。
    pub fn compile(&mut self, mut rule: Rule) -> Result<CompiledRule> {
        let root = match rule.ast.take() {
            Some(root) => {
                self.validate_cached(&root)?;
                root
            }
            None => self.compile_str(&rule.rule_string)?,
        };

        let required_fields = self.extract_fields(&root);

        self.compile_version += 1;

        Ok(CompiledRule {
            rule,
            root,
            required_fields,
            compile_version: self.compile_version,
        })
    }

    /// 校验还原的语法树：字段名非空，深度不超过解析器允许的范围
    fn validate_cached(&self, root: &RuleNode) -> Result<()> {
        // 还原的语法树不经过解析器，按记号上限约束其深度
        if root.depth() > self.limits.max_tokens {
            return Err(RuleError::InvalidAst(format!(
                "语法树深度 {} 超过上限",
                root.depth()
            )));
        }

        self.validate_node(root, "root")
    }

    fn validate_node(&self, node: &RuleNode, path: &str) -> Result<()> {
        match node {
            RuleNode::Comparison { field, value, .. } => {
                if field.is_empty() {
                    return Err(RuleError::InvalidAst(format!(
                        "条件 '{}' 的字段不能为空",
                        path
                    )));
                }
                // 文本字面量没有转义语法，含单引号时规范文本无法再次解析
                if matches!(value, Literal::Text(text) if text.contains('\'')) {
                    return Err(RuleError::InvalidAst(format!(
                        "条件 '{}' 的文本字面量不能包含单引号",
                        path
                    )));
                }
                Ok(())
            }
            RuleNode::Logical { left, right, .. } => {
                self.validate_node(left, &format!("{}.left", path))?;
                self.validate_node(right, &format!("{}.right", path))
            }
        }
    }

    fn extract_fields(&self, node: &RuleNode) -> HashSet<String> {
        let mut fields = HashSet::new();
        Self::collect_fields(node, &mut fields);
        fields
    }

    fn collect_fields(node: &RuleNode, fields: &mut HashSet<String>) {
        match node {
            RuleNode::Comparison { field, .. } => {
                fields.insert(field.clone());
            }
            RuleNode::Logical { left, right, .. } => {
                Self::collect_fields(left, fields);
                Self::collect_fields(right, fields);
            }
        }
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}
