//! 词法分析器
//!
//! 将规则文本按从左到右的顺序切分为记号，空白只作为分隔符，不产出记号。
//! 词法类别按固定顺序尝试匹配，多字符操作符优先于其单字符前缀：
//!
//! 1. 单引号字符串（不支持转义）
//! 2. 左右括号
//! 3. 比较操作符 `>=` `<=` `!=` `==` `>` `<` `=`
//! 4. 关键字 `AND` / `OR`（整词匹配，区分大小写）
//! 5. 数字字面量
//! 6. 标识符 `\w+`

use crate::error::LexError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<ws>\s+)|(?P<string>'[^']*')|(?P<lparen>\()|(?P<rparen>\))|(?P<cmp>>=|<=|!=|==|>|<|=)|(?P<logic>(?:AND|OR)\b)|(?P<number>-?\d+(?:\.\d+)?\b)|(?P<ident>\w+))",
    )
    .expect("记号正则表达式无效")
});

/// 记号类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Identifier,
    StringLiteral,
    NumberLiteral,
    ComparisonOperator,
    LogicalOperator,
    LeftParen,
    RightParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identifier => "标识符",
            Self::StringLiteral => "字符串字面量",
            Self::NumberLiteral => "数字字面量",
            Self::ComparisonOperator => "比较操作符",
            Self::LogicalOperator => "逻辑操作符",
            Self::LeftParen => "左括号",
            Self::RightParen => "右括号",
        };
        write!(f, "{}", s)
    }
}

/// 记号
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// 原始文本（字符串字面量包含引号）
    pub text: String,
    /// 在源文本中的字节偏移
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            offset,
        }
    }

    /// 记号结束位置
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

/// 对规则文本做词法分析
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let caps = TOKEN_REGEX
            .captures(rest)
            .ok_or_else(|| unrecognized(rest, pos))?;

        // 正则以 ^ 锚定，整体匹配必然从 rest 起始处开始
        let matched = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        if matched.is_empty() {
            return Err(unrecognized(rest, pos));
        }

        let kind = if caps.name("ws").is_some() {
            None
        } else if caps.name("string").is_some() {
            Some(TokenKind::StringLiteral)
        } else if caps.name("lparen").is_some() {
            Some(TokenKind::LeftParen)
        } else if caps.name("rparen").is_some() {
            Some(TokenKind::RightParen)
        } else if caps.name("cmp").is_some() {
            Some(TokenKind::ComparisonOperator)
        } else if caps.name("logic").is_some() {
            Some(TokenKind::LogicalOperator)
        } else if caps.name("number").is_some() {
            Some(TokenKind::NumberLiteral)
        } else {
            Some(TokenKind::Identifier)
        };

        if let Some(kind) = kind {
            tokens.push(Token::new(kind, matched, pos));
        }
        pos += matched.len();
    }

    Ok(tokens)
}

fn unrecognized(rest: &str, pos: usize) -> LexError {
    match rest.chars().next() {
        Some('\'') => LexError::new(pos, "字符串字面量缺少结束引号"),
        Some(c) => LexError::new(pos, format!("无法识别的字符 '{}'", c)),
        None => LexError::new(pos, "意外的输入结尾"),
    }
}
