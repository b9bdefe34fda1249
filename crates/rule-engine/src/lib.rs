//! 资格规则引擎
//!
//! 将 `age > 30 AND department = 'Sales'` 这样的规则文本编译成语法树，
//! 并针对任意结构化记录求值，给出准入/拒绝判定：
//! - 词法分析与递归下降语法分析
//! - 类型感知、失败即拒绝的条件评估
//! - 规则组合、编译缓存与带追踪的执行
//! - 线程安全的规则存储与请求服务

pub mod combinator;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod models;
pub mod operators;
pub mod parser;
pub mod record;
pub mod service;
pub mod store;

pub use combinator::{combine, combine_with_limits};
pub use compiler::{CompiledRule, RuleCompiler, compile, compile_with_limits};
pub use error::{LexError, Result, RuleError, SyntaxError};
pub use evaluator::{ConditionEvaluator, evaluate};
pub use executor::RuleExecutor;
pub use lexer::{Token, TokenKind, tokenize};
pub use models::{EvaluationResult, Literal, Rule, RuleNode, from_persisted_json};
pub use operators::{ComparisonOperator, LogicalOperator};
pub use parser::{ParseLimits, parse, parse_with_limits};
pub use record::{FieldValue, Record};
pub use service::{CombinePart, Request, Response, RuleService};
pub use store::{RuleStore, RuleStoreStats};
