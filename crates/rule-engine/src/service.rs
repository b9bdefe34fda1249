//! 规则请求服务
//!
//! 与传输层无关的请求分发：把 JSON 请求映射到规则存储和执行器，
//! 并把错误区分为用户错误（4xx）与内部错误（5xx）。

use crate::compiler::compile_with_limits;
use crate::error::{Result, RuleError};
use crate::executor::RuleExecutor;
use crate::models::{EvaluationResult, Rule, RuleNode};
use crate::operators::LogicalOperator;
use crate::record::Record;
use crate::store::RuleStore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// 服务请求，以 `action` 字段区分
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Create {
        rule_string: String,
        #[serde(default)]
        description: String,
    },
    List,
    Get {
        rule_id: String,
    },
    Update {
        rule_id: String,
        rule_string: String,
        #[serde(default)]
        description: Option<String>,
    },
    Delete {
        rule_id: String,
    },
    /// 只校验规则文本，不入库
    Validate {
        rule_string: String,
    },
    Evaluate {
        rule_id: String,
        data: Value,
    },
    Combine {
        rules: Vec<CombinePart>,
    },
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::List => "list",
            Self::Get { .. } => "get",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Validate { .. } => "validate",
            Self::Evaluate { .. } => "evaluate",
            Self::Combine { .. } => "combine",
        }
    }
}

/// 组合请求中的一项
#[derive(Debug, Clone, Deserialize)]
pub struct CombinePart {
    pub rule_id: String,
    /// 与下一项之间的逻辑操作符，最后一项可省略
    #[serde(default)]
    pub operator: Option<LogicalOperator>,
}

/// 服务响应
#[derive(Debug, Clone, Default, Serialize)]
pub struct Response {
    pub success: bool,
    /// HTTP 语义的状态码
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<RuleNode>,
    /// 规范化的规则文本
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Response {
    fn ok(status: u16) -> Self {
        Self {
            success: true,
            status,
            ..Default::default()
        }
    }

    fn with_rule(rule: Rule, status: u16) -> Self {
        Self {
            rule: Some(rule),
            ..Self::ok(status)
        }
    }

    /// 请求本身无法解析
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: 400,
            error: Some(message.into()),
            code: Some("INVALID_REQUEST".to_string()),
            ..Default::default()
        }
    }

    /// 由错误构造响应
    pub fn from_error(err: &RuleError) -> Self {
        let details = match err {
            RuleError::Lex(e) => Some(json!({ "position": e.position })),
            RuleError::Syntax(e) => Some(json!({ "position": e.position })),
            _ => None,
        };

        Self {
            success: false,
            status: err.status_code(),
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
            details,
            ..Default::default()
        }
    }
}

/// 规则服务
#[derive(Clone)]
pub struct RuleService {
    store: RuleStore,
    executor: Arc<RuleExecutor>,
}

impl RuleService {
    pub fn new(store: RuleStore) -> Self {
        Self::with_executor(store, RuleExecutor::new())
    }

    pub fn with_executor(store: RuleStore, executor: RuleExecutor) -> Self {
        Self {
            store,
            executor: Arc::new(executor),
        }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// 处理请求，错误会被转换成对应状态码的响应
    #[instrument(skip(self, request), fields(action = request.action()))]
    pub fn handle(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_user_error() {
                    warn!(code = err.code(), "请求处理失败: {}", err);
                } else if matches!(err, RuleError::RuleNotFound(_)) {
                    warn!("{}", err);
                } else {
                    error!(code = err.code(), "内部错误: {}", err);
                }
                Response::from_error(&err)
            }
        }
    }

    /// 处理一行原始输入，空行返回 None
    ///
    /// 非 UTF-8 或无法解析的 JSON 都作为请求错误返回，不会中断后续请求。
    pub fn handle_line(&self, line: &[u8]) -> Option<Response> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("请求不是有效的 UTF-8: {}", e);
                return Some(Response::bad_request(format!("请求不是有效的 UTF-8: {}", e)));
            }
        };
        if line.is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!("无法解析请求: {}", e);
                Response::bad_request(format!("无法解析请求: {}", e))
            }
        };
        Some(response)
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::Create {
                rule_string,
                description,
            } => {
                let rule = self
                    .store
                    .create(&rule_string, &description)
                    .inspect_err(record_compile_error)?;
                Ok(Response::with_rule(rule, 201))
            }
            Request::List => Ok(Response {
                rules: Some(self.store.list()),
                ..Response::ok(200)
            }),
            Request::Get { rule_id } => {
                let rule = self
                    .store
                    .get(&rule_id)
                    .ok_or(RuleError::RuleNotFound(rule_id))?;
                Ok(Response::with_rule(rule, 200))
            }
            Request::Update {
                rule_id,
                rule_string,
                description,
            } => {
                let rule = self
                    .store
                    .update(&rule_id, &rule_string, description.as_deref())
                    .inspect_err(record_compile_error)?;
                Ok(Response::with_rule(rule, 200))
            }
            Request::Delete { rule_id } => {
                let rule = self.store.delete(&rule_id)?;
                Ok(Response::with_rule(rule, 200))
            }
            Request::Validate { rule_string } => {
                let ast = compile_with_limits(&rule_string, &self.store.limits())
                    .inspect_err(record_compile_error)?;
                Ok(Response {
                    rule_string: Some(ast.to_string()),
                    ast: Some(ast),
                    ..Response::ok(200)
                })
            }
            Request::Evaluate { rule_id, data } => {
                let result = self.evaluate(&rule_id, data)?;
                Ok(Response {
                    eligible: Some(result.eligible),
                    result: Some(result),
                    ..Response::ok(200)
                })
            }
            Request::Combine { rules } => {
                let parts: Vec<(String, Option<LogicalOperator>)> = rules
                    .into_iter()
                    .map(|part| (part.rule_id, part.operator))
                    .collect();
                let rule = self
                    .store
                    .combine(&parts)
                    .inspect_err(record_compile_error)?;
                Ok(Response::with_rule(rule, 201))
            }
        }
    }

    /// 按 ID 评估规则
    pub fn evaluate(&self, rule_id: &str, data: Value) -> Result<EvaluationResult> {
        let compiled = self
            .store
            .get_compiled(rule_id)
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))?;
        let record = Record::from_value(data)?;

        let result = self.executor.execute(&compiled, &record);

        metrics::counter!(
            "rule_evaluations_total",
            "eligible" => result.eligible.to_string()
        )
        .increment(1);
        metrics::histogram!("rule_evaluation_duration_seconds")
            .record(result.evaluation_time_us as f64 / 1_000_000.0);

        info!(
            rule_id = %rule_id,
            eligible = result.eligible,
            matched = result.matched_conditions.len(),
            "规则评估完成"
        );

        Ok(result)
    }
}

fn record_compile_error(err: &RuleError) {
    if matches!(err, RuleError::Lex(_) | RuleError::Syntax(_)) {
        metrics::counter!("rule_compile_errors_total", "code" => err.code()).increment(1);
    }
}
