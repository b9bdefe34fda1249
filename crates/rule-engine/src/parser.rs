//! 语法分析器
//!
//! 递归下降解析记号序列，生成语法树：
//!
//! ```text
//! expression := condition ( ('AND' | 'OR') condition )*
//! condition  := '(' expression ')' | field comparisonOp literal
//! literal    := StringLiteral | NumberLiteral
//! ```
//!
//! AND 与 OR 优先级相同，从左到右结合：`A AND B OR C` 等价于 `(A AND B) OR C`。
//! 括号的结合最紧。

use crate::error::SyntaxError;
use crate::lexer::{Token, TokenKind};
use crate::models::{Literal, RuleNode};
use crate::operators::{ComparisonOperator, LogicalOperator};

/// 解析资源限制，防止恶意输入导致栈溢出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// 最大记号数
    pub max_tokens: usize,
    /// 最大括号嵌套深度
    pub max_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            max_depth: 64,
        }
    }
}

/// 使用默认限制解析记号序列
pub fn parse(tokens: &[Token]) -> Result<RuleNode, SyntaxError> {
    parse_with_limits(tokens, &ParseLimits::default())
}

/// 按指定限制解析记号序列
pub fn parse_with_limits(tokens: &[Token], limits: &ParseLimits) -> Result<RuleNode, SyntaxError> {
    Parser::new(tokens, limits).parse()
}

/// 单次解析的状态，游标只属于本次调用
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    limits: &'a ParseLimits,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], limits: &'a ParseLimits) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            limits,
        }
    }

    fn parse(mut self) -> Result<RuleNode, SyntaxError> {
        if self.tokens.is_empty() {
            return Err(SyntaxError::new(0, "规则为空"));
        }

        if self.tokens.len() > self.limits.max_tokens {
            return Err(SyntaxError::new(
                0,
                format!(
                    "记号数量 {} 超过上限 {}",
                    self.tokens.len(),
                    self.limits.max_tokens
                ),
            ));
        }

        let root = self.parse_expression()?;

        if let Some(token) = self.peek() {
            return Err(SyntaxError::new(
                token.offset,
                format!("表达式后存在多余的记号 '{}'", token.text),
            ));
        }

        Ok(root)
    }

    /// expression := condition ( ('AND' | 'OR') condition )*
    fn parse_expression(&mut self) -> Result<RuleNode, SyntaxError> {
        let mut left = self.parse_condition()?;

        while let Some(token) = self.peek() {
            if token.kind != TokenKind::LogicalOperator {
                break;
            }
            let operator: LogicalOperator = token.text.parse().map_err(|_| {
                SyntaxError::new(token.offset, format!("无效的逻辑操作符 '{}'", token.text))
            })?;
            self.pos += 1;

            let right = self.parse_condition()?;
            left = RuleNode::logical(operator, left, right);
        }

        Ok(left)
    }

    /// condition := '(' expression ')' | field comparisonOp literal
    fn parse_condition(&mut self) -> Result<RuleNode, SyntaxError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::LeftParen => {
                let open_offset = token.offset;
                self.pos += 1;
                self.enter_group(open_offset)?;

                let expr = self.parse_expression()?;

                match self.peek() {
                    Some(token) if token.kind == TokenKind::RightParen => {
                        self.pos += 1;
                        self.depth -= 1;
                        Ok(expr)
                    }
                    Some(token) => Err(SyntaxError::new(
                        token.offset,
                        format!(
                            "缺少右括号 ')'（与位置 {} 的左括号匹配），实际为 '{}'",
                            open_offset, token.text
                        ),
                    )),
                    None => Err(SyntaxError::new(
                        self.end_offset(),
                        format!("缺少右括号 ')'（与位置 {} 的左括号匹配）", open_offset),
                    )),
                }
            }
            Some(_) => self.parse_comparison(),
            None => Err(SyntaxError::new(self.end_offset(), "缺少比较条件")),
        }
    }

    /// field comparisonOp literal
    fn parse_comparison(&mut self) -> Result<RuleNode, SyntaxError> {
        let tokens = self.tokens;
        let remaining = &tokens[self.pos..];
        if remaining.len() < 3 {
            let offset = remaining.first().map(|t| t.offset).unwrap_or(self.end_offset());
            return Err(SyntaxError::new(
                offset,
                "比较条件不完整，需要 '字段 操作符 值' 三个部分",
            ));
        }

        let (field, op, literal) = (&remaining[0], &remaining[1], &remaining[2]);

        if field.kind != TokenKind::Identifier {
            return Err(SyntaxError::new(
                field.offset,
                format!("期望字段名，实际为{} '{}'", field.kind, field.text),
            ));
        }

        if op.kind != TokenKind::ComparisonOperator {
            return Err(SyntaxError::new(
                op.offset,
                format!("期望比较操作符，实际为{} '{}'", op.kind, op.text),
            ));
        }
        let operator: ComparisonOperator = op.text.parse().map_err(|_| {
            SyntaxError::new(op.offset, format!("无效的比较操作符 '{}'", op.text))
        })?;

        if !matches!(
            literal.kind,
            TokenKind::StringLiteral | TokenKind::NumberLiteral
        ) {
            return Err(SyntaxError::new(
                literal.offset,
                format!(
                    "期望字面量（字符串或数字），实际为{} '{}'",
                    literal.kind, literal.text
                ),
            ));
        }

        self.pos += 3;

        Ok(RuleNode::Comparison {
            field: field.text.clone(),
            operator,
            value: Literal::from_token_text(&literal.text),
        })
    }

    fn enter_group(&mut self, offset: usize) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(SyntaxError::new(
                offset,
                format!("括号嵌套深度超过上限 {}", self.limits.max_depth),
            ));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn end_offset(&self) -> usize {
        self.tokens.last().map(Token::end).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(input: &str) -> Result<RuleNode, SyntaxError> {
        parse(&tokenize(input).unwrap())
    }

    fn cmp(field: &str, op: ComparisonOperator, value: impl Into<Literal>) -> RuleNode {
        RuleNode::comparison(field, op, value)
    }

    #[test]
    fn test_single_comparison() {
        let ast = parse_str("age > 30").unwrap();
        assert_eq!(ast, cmp("age", ComparisonOperator::Gt, 30));
    }

    #[test]
    fn test_and_of_two_conditions() {
        let ast = parse_str("age > 30 AND department = 'Sales'").unwrap();
        assert_eq!(
            ast,
            RuleNode::and(
                cmp("age", ComparisonOperator::Gt, 30),
                cmp("department", ComparisonOperator::Eq, "Sales"),
            )
        );
    }

    #[test]
    fn test_left_associative_chaining() {
        let ast = parse_str("a = 1 AND b = 2 OR c = 3").unwrap();
        let expected = RuleNode::or(
            RuleNode::and(
                cmp("a", ComparisonOperator::Eq, 1),
                cmp("b", ComparisonOperator::Eq, 2),
            ),
            cmp("c", ComparisonOperator::Eq, 3),
        );
        assert_eq!(ast, expected);

        // OR 在前时同样从左结合，不存在 AND 优先
        let ast = parse_str("a = 1 OR b = 2 AND c = 3").unwrap();
        let expected = RuleNode::and(
            RuleNode::or(
                cmp("a", ComparisonOperator::Eq, 1),
                cmp("b", ComparisonOperator::Eq, 2),
            ),
            cmp("c", ComparisonOperator::Eq, 3),
        );
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_parentheses_group_right_side() {
        let ast = parse_str("a = 1 AND (b = 2 OR c = 3)").unwrap();
        let expected = RuleNode::and(
            cmp("a", ComparisonOperator::Eq, 1),
            RuleNode::or(
                cmp("b", ComparisonOperator::Eq, 2),
                cmp("c", ComparisonOperator::Eq, 3),
            ),
        );
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_redundant_parentheses() {
        let ast = parse_str("((age >= 18))").unwrap();
        assert_eq!(ast, cmp("age", ComparisonOperator::Gte, 18));
    }

    #[test]
    fn test_double_equals_alias() {
        let ast = parse_str("status == 'active'").unwrap();
        assert_eq!(ast, cmp("status", ComparisonOperator::Eq, "active"));
    }

    #[test]
    fn test_empty_rule() {
        let err = parse(&[]).unwrap_err();
        assert!(err.reason.contains("为空"));
    }

    #[test]
    fn test_too_few_tokens() {
        let err = parse_str("invalid rule").unwrap_err();
        assert_eq!(err.position, 0);
        assert!(err.reason.contains("不完整"));
    }

    #[test]
    fn test_missing_closing_paren() {
        let err = parse_str("(age > 30 AND department = 'Sales'").unwrap_err();
        assert!(err.reason.contains("缺少右括号"));
        assert_eq!(err.position, "(age > 30 AND department = 'Sales'".len());
    }

    #[test]
    fn test_stray_closing_paren() {
        let err = parse_str("age > 30)").unwrap_err();
        assert_eq!(err.position, 8);
        assert!(err.reason.contains("多余"));
    }

    #[test]
    fn test_trailing_tokens() {
        let err = parse_str("age > 30 department").unwrap_err();
        assert!(err.reason.contains("department"));
    }

    #[test]
    fn test_dangling_logical_operator() {
        let err = parse_str("age > 30 AND").unwrap_err();
        assert!(err.reason.contains("缺少比较条件"));
    }

    #[test]
    fn test_missing_operator() {
        let err = parse_str("age 30 AND b = 1").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.reason.contains("比较操作符"));
    }

    #[test]
    fn test_field_must_be_identifier() {
        let err = parse_str("30 < age").unwrap_err();
        assert!(err.reason.contains("字段名"));
    }

    #[test]
    fn test_literal_must_be_string_or_number() {
        let err = parse_str("department = Sales").unwrap_err();
        assert!(err.reason.contains("字面量"));
    }

    #[test]
    fn test_lowercase_keyword_rejected() {
        assert!(parse_str("a = 1 and b = 2").is_err());
    }

    #[test]
    fn test_token_limit() {
        let limits = ParseLimits {
            max_tokens: 5,
            max_depth: 64,
        };
        let tokens = tokenize("a = 1 AND b = 2").unwrap();
        let err = parse_with_limits(&tokens, &limits).unwrap_err();
        assert!(err.reason.contains("上限"));
    }

    #[test]
    fn test_depth_limit() {
        let limits = ParseLimits {
            max_tokens: 4096,
            max_depth: 3,
        };

        let ok = tokenize("(((a = 1)))").unwrap();
        assert!(parse_with_limits(&ok, &limits).is_ok());

        let too_deep = tokenize("((((a = 1))))").unwrap();
        let err = parse_with_limits(&too_deep, &limits).unwrap_err();
        assert!(err.reason.contains("嵌套深度"));
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let input = format!("{}a = 1{}", "(".repeat(10_000), ")".repeat(10_000));
        let tokens = tokenize(&input).unwrap();
        let limits = ParseLimits {
            max_tokens: usize::MAX,
            max_depth: 64,
        };
        assert!(parse_with_limits(&tokens, &limits).is_err());
    }
}
