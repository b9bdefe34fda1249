//! 规则存储管理
//!
//! 使用 DashMap 提供线程安全的规则存储，规则与其语法树缓存一起保存。
//! 规则文本是唯一的事实来源：创建和更新都会重新编译，编译失败的规则不会入库。

use crate::combinator::combine_with_limits;
use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{Result, RuleError};
use crate::models::Rule;
use crate::operators::LogicalOperator;
use crate::parser::ParseLimits;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    /// 编译后的规则
    rules: Arc<DashMap<String, CompiledRule>>,
    /// 规则编译器
    compiler: Arc<parking_lot::Mutex<RuleCompiler>>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self::with_limits(ParseLimits::default())
    }

    /// 使用指定解析限制创建规则存储
    pub fn with_limits(limits: ParseLimits) -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            compiler: Arc::new(parking_lot::Mutex::new(RuleCompiler::with_limits(limits))),
        }
    }

    pub fn limits(&self) -> ParseLimits {
        *self.compiler.lock().limits()
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 创建规则，分配新 ID
    #[instrument(skip(self, description))]
    pub fn create(&self, rule_string: &str, description: &str) -> Result<Rule> {
        let rule = Rule::new(rule_string.trim(), description);
        let compiled = self.compile(rule)?;
        let stored = compiled.to_rule();

        info!("规则已创建: {}", stored.id);
        self.rules.insert(stored.id.clone(), compiled);
        Ok(stored)
    }

    /// 加载规则（从 Rule 对象），同 ID 的规则会被覆盖
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn load(&self, rule: Rule) -> Result<()> {
        let compiled = self.compile(rule)?;

        let rule_id = compiled.id().to_string();
        self.rules.insert(rule_id.clone(), compiled);

        info!("规则已加载: {}", rule_id);
        Ok(())
    }

    /// 加载规则（从持久化 JSON）
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let compiled = {
            let mut compiler = self.compiler.lock();
            compiler.compile_from_json(json)?
        };

        let rule_id = compiled.id().to_string();
        self.rules.insert(rule_id.clone(), compiled);

        info!("规则已加载: {}", rule_id);
        Ok(rule_id)
    }

    /// 批量加载规则，跳过无法编译的规则并返回成功加载的 ID
    #[instrument(skip(self, rules))]
    pub fn load_batch(&self, rules: Vec<Rule>) -> Vec<String> {
        let mut loaded_ids = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();

        for rule in rules {
            let rule_id = rule.id.clone();
            match self.load(rule) {
                Ok(()) => loaded_ids.push(rule_id),
                Err(e) => errors.push((rule_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!(
            "批量加载完成: {} 成功, {} 失败",
            loaded_ids.len(),
            errors.len()
        );
        loaded_ids
    }

    /// 获取规则（含语法树缓存）
    pub fn get(&self, rule_id: &str) -> Option<Rule> {
        self.rules.get(rule_id).map(|r| r.to_rule())
    }

    /// 获取编译后的规则
    pub fn get_compiled(&self, rule_id: &str) -> Option<CompiledRule> {
        self.rules.get(rule_id).map(|r| r.clone())
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 获取所有规则，按创建时间倒序
    pub fn list(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.rules.iter().map(|r| r.to_rule()).collect();
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rules
    }

    /// 更新规则文本，`description` 为 None 时保留原描述
    #[instrument(skip(self, rule_string, description))]
    pub fn update(
        &self,
        rule_id: &str,
        rule_string: &str,
        description: Option<&str>,
    ) -> Result<Rule> {
        // 持有分片写锁直到替换完成，避免与并发的删除交错
        let mut entry = match self.rules.get_mut(rule_id) {
            Some(entry) => entry,
            None => {
                warn!("更新不存在的规则: {}", rule_id);
                return Err(RuleError::RuleNotFound(rule_id.to_string()));
            }
        };
        let existing = entry.rule.clone();

        let rule = Rule {
            rule_string: rule_string.trim().to_string(),
            description: description
                .map(str::to_string)
                .unwrap_or(existing.description),
            ast: None,
            updated_at: Utc::now(),
            ..existing
        };

        let compiled = self.compile(rule)?;
        let stored = compiled.to_rule();
        *entry = compiled;
        drop(entry);

        info!("规则已更新: {}", rule_id);
        Ok(stored)
    }

    /// 删除规则，返回被删除的规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<Rule> {
        match self.rules.remove(rule_id) {
            Some((_, compiled)) => {
                info!("规则已删除: {}", rule_id);
                Ok(compiled.to_rule())
            }
            None => {
                warn!("删除不存在的规则: {}", rule_id);
                Err(RuleError::RuleNotFound(rule_id.to_string()))
            }
        }
    }

    /// 组合已有规则，生成并保存一条新规则
    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    pub fn combine(&self, parts: &[(String, Option<LogicalOperator>)]) -> Result<Rule> {
        let mut texts = Vec::with_capacity(parts.len());
        for (rule_id, operator) in parts {
            let rule_string = self
                .rules
                .get(rule_id)
                .map(|r| r.rule_string().to_string())
                .ok_or_else(|| RuleError::RuleNotFound(rule_id.clone()))?;
            texts.push((rule_string, *operator));
        }

        let combined = combine_with_limits(&texts, &self.limits())?;
        self.create(&combined, &format!("由 {} 条规则组合生成", parts.len()))
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    /// 获取规则统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let rules_count = self.rules.len();
        let (total_fields, total_conditions) =
            self.rules.iter().fold((0, 0), |(fields, conditions), r| {
                (
                    fields + r.required_fields.len(),
                    conditions + r.root.condition_count(),
                )
            });

        RuleStoreStats {
            rules_count,
            total_fields,
            total_conditions,
            avg_fields_per_rule: if rules_count > 0 {
                total_fields as f64 / rules_count as f64
            } else {
                0.0
            },
        }
    }

    fn compile(&self, rule: Rule) -> Result<CompiledRule> {
        let mut compiler = self.compiler.lock();
        compiler.compile(rule)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 规则存储统计信息
#[derive(Debug, Clone)]
pub struct RuleStoreStats {
    /// 规则总数
    pub rules_count: usize,
    /// 所有规则使用的字段总数
    pub total_fields: usize,
    /// 所有规则的比较条件总数
    pub total_conditions: usize,
    /// 平均每条规则使用的字段数
    pub avg_fields_per_rule: f64,
}
