//! 规则引擎领域模型

use crate::error::{Result, RuleError};
use crate::operators::{ComparisonOperator, LogicalOperator};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 比较条件右侧的字面量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Number(f64),
    Text(String),
}

impl Literal {
    /// 由字面量记号文本构造：带引号的一律视为文本，否则尝试按十进制数解析
    pub fn from_token_text(raw: &str) -> Self {
        if let Some(inner) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Self::Text(inner.to_string());
        }

        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(raw.to_string()),
        }
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// 语法树节点
///
/// 叶子节点一定是比较条件，内部节点一定是恰好有两个子节点的逻辑节点。
/// 构造后不可变，可以在多个线程间只读共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleNode {
    Comparison {
        field: String,
        operator: ComparisonOperator,
        value: Literal,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<RuleNode>,
        right: Box<RuleNode>,
    },
}

impl RuleNode {
    pub fn comparison(
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Literal>,
    ) -> Self {
        Self::Comparison {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn logical(operator: LogicalOperator, left: RuleNode, right: RuleNode) -> Self {
        Self::Logical {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: RuleNode, right: RuleNode) -> Self {
        Self::logical(LogicalOperator::And, left, right)
    }

    pub fn or(left: RuleNode, right: RuleNode) -> Self {
        Self::logical(LogicalOperator::Or, left, right)
    }

    /// 树的深度（单个比较条件深度为 1）
    pub fn depth(&self) -> usize {
        match self {
            Self::Comparison { .. } => 1,
            Self::Logical { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// 比较条件的数量
    pub fn condition_count(&self) -> usize {
        match self {
            Self::Comparison { .. } => 1,
            Self::Logical { left, right, .. } => left.condition_count() + right.condition_count(),
        }
    }

    /// 从持久化的 JSON 编码还原语法树
    pub fn from_json(json: &str) -> Result<Self> {
        from_persisted_json(json).map_err(|e| RuleError::InvalidAst(e.to_string()))
    }

    /// 编码为 JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 输出规范化的规则文本
///
/// 逻辑运算左结合，所以左侧子树无需括号；右侧若为逻辑节点则加括号以保留结构。
impl fmt::Display for RuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field, operator, value),
            Self::Logical {
                operator,
                left,
                right,
            } => match right.as_ref() {
                Self::Logical { .. } => write!(f, "{} {} ({})", left, operator, right),
                Self::Comparison { .. } => write!(f, "{} {} {}", left, operator, right),
            },
        }
    }
}

/// 解析持久化的 JSON
///
/// 语法树每个逻辑节点占一层 JSON 嵌套，左结合的长条件链会超过 serde_json
/// 默认的 128 层限制，因此关闭该限制，并在需要时在堆上扩展栈。
pub fn from_persisted_json<T: DeserializeOwned>(json: &str) -> serde_json::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

/// 规则定义
///
/// `rule_string` 是唯一的事实来源，`ast` 只是其派生缓存，规则文本变化时必须重新计算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub rule_string: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<RuleNode>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(rule_string: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            rule_string: rule_string.into(),
            description: description.into(),
            ast: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 评估结果
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub rule_id: String,
    pub eligible: bool,
    /// 求值为真的比较条件（规范文本）
    pub matched_conditions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: u64,
}

impl EvaluationResult {
    pub fn new(rule_id: String) -> Self {
        Self {
            rule_id,
            eligible: false,
            matched_conditions: Vec::new(),
            evaluation_trace: Vec::new(),
            evaluation_time_us: 0,
        }
    }
}
