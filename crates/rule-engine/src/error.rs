//! 规则引擎错误类型
//!
//! 词法错误和语法错误属于用户输入错误，直接返回给调用方，不做任何恢复或重试。
//! 评估阶段不会因为数据形态问题报错（见 evaluator 模块的失败即拒绝策略）。

use thiserror::Error;

/// 词法错误：当前位置无法匹配任何词法类别
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("词法错误 (位置 {position}): {message}")]
pub struct LexError {
    /// 出错位置（源文本中的字节偏移）
    pub position: usize,
    pub message: String,
}

impl LexError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// 语法错误：记号序列不构成合法表达式
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("语法错误 (位置 {position}): {reason}")]
pub struct SyntaxError {
    /// 出错位置（源文本中的字节偏移，输入末尾时为最后一个记号的结束位置）
    pub position: usize,
    pub reason: String,
}

impl SyntaxError {
    pub fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("无效的操作符: {operator}")]
    InvalidOperator { operator: String },

    #[error("无效的语法树: {0}")]
    InvalidAst(String),

    #[error("无效的输入记录: {0}")]
    InvalidRecord(String),

    #[error("规则组合失败: {0}")]
    Combine(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lex(_) => "LEX_ERROR",
            Self::Syntax(_) => "SYNTAX_ERROR",
            Self::InvalidOperator { .. } => "INVALID_OPERATOR",
            Self::InvalidAst(_) => "INVALID_AST",
            Self::InvalidRecord(_) => "INVALID_RECORD",
            Self::Combine(_) => "COMBINE_ERROR",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }

    /// 是否为用户输入错误（规则文本或请求数据有误）
    ///
    /// 操作符无效和语法树损坏只可能来自外部构造或持久化数据损坏，属于内部错误。
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Lex(_) | Self::Syntax(_) | Self::InvalidRecord(_) | Self::Combine(_)
        )
    }

    /// 转换为 HTTP 语义的状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RuleNotFound(_) => 404,
            e if e.is_user_error() => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = RuleError::RuleNotFound("rule-001".to_string());
        assert_eq!(err.code(), "RULE_NOT_FOUND");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_user_errors() {
        let lex: RuleError = LexError::new(3, "无法识别的字符 '#'").into();
        assert!(lex.is_user_error());
        assert_eq!(lex.status_code(), 400);
        assert!(lex.to_string().contains("位置 3"));

        let syntax: RuleError = SyntaxError::new(0, "规则为空").into();
        assert!(syntax.is_user_error());
        assert_eq!(syntax.code(), "SYNTAX_ERROR");
    }

    #[test]
    fn test_internal_errors() {
        let err = RuleError::InvalidOperator {
            operator: "~=".to_string(),
        };
        assert!(!err.is_user_error());
        assert_eq!(err.status_code(), 500);
    }
}
