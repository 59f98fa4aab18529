//! 计划评估器：重复计划检测 + 步骤结果错误提取
//!
//! 重复判定同时查进程内集合与持久历史（PlanHistoryManager）；
//! evaluate 先查重、后登记，因此对同一计划的第二次 evaluate 必然报重复。

use std::collections::HashSet;

use serde_json::Value;

use crate::core::AgentError;
use crate::engine::history::PlanHistoryManager;
use crate::engine::plan::{plan_hash, ExecutionPlan, StepResults};

/// evaluate 的结论
#[derive(Debug, Clone, Default)]
pub struct PlanAssessment {
    pub has_plan: bool,
    pub plan_duplicate: bool,
    pub has_errors: bool,
    pub errors: Vec<String>,
}

/// 计划评估器；持久存储在构造时注入（无全局状态）
pub struct PlanEvaluator {
    history: PlanHistoryManager,
    session_hashes: HashSet<String>,
}

impl PlanEvaluator {
    pub fn new(history: PlanHistoryManager) -> Self {
        Self {
            history,
            session_hashes: HashSet::new(),
        }
    }

    /// 是否与已执行过的计划重复（本会话或历史文件）
    pub fn is_duplicate(&self, plan: &ExecutionPlan) -> bool {
        let hash = plan_hash(plan);
        self.session_hashes.contains(&hash) || self.history.has(&hash)
    }

    /// 登记计划哈希到会话集合与持久历史
    pub fn register_plan(&mut self, plan: &ExecutionPlan) -> Result<(), AgentError> {
        let hash = plan_hash(plan);
        self.session_hashes.insert(hash.clone());
        self.history.add(&hash)
    }

    /// 查重并登记，同时扫描每个步骤结果提取错误：
    /// JSON 结果看显式 error 字段，非 JSON 看字面 "error" 子串。
    pub fn evaluate(
        &mut self,
        plan: &ExecutionPlan,
        step_results: &StepResults,
    ) -> Result<PlanAssessment, AgentError> {
        let duplicate = self.is_duplicate(plan);
        self.register_plan(plan)?;

        let errors = extract_errors(step_results);
        Ok(PlanAssessment {
            has_plan: !plan.steps.is_empty(),
            plan_duplicate: duplicate,
            has_errors: !errors.is_empty(),
            errors,
        })
    }

    pub fn history(&self) -> &PlanHistoryManager {
        &self.history
    }
}

/// 从步骤结果中提取错误描述
pub fn extract_errors(step_results: &StepResults) -> Vec<String> {
    let mut errors = Vec::new();
    for (step, raw) in step_results {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => {
                if let Some(err) = map.get("error") {
                    let text = match err {
                        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                        Value::Null => None,
                        Value::String(_) => None,
                        other => Some(other.to_string()),
                    };
                    if let Some(text) = text {
                        errors.push(format!("step {}: {}", step, text));
                    }
                }
            }
            Ok(_) => {}
            Err(_) => {
                if raw.to_lowercase().contains("error") {
                    errors.push(format!("step {}: {}", step, raw.trim()));
                }
            }
        }
    }
    errors
}
