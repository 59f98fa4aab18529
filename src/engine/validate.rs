//! 结果校验与参数修复（LLM 支撑的可选能力）
//!
//! 二者都是显式能力接口，构造时注入；缺省（None）即关闭，
//! 不做运行时属性探测。校验裁决只有三种：ok / retry / parse_error。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::engine::plan::ExecutionStep;
use crate::engine::planning::extract_json_block;
use crate::engine::prompts::PromptTemplates;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 校验裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationVerdict {
    Ok,
    Retry,
    /// 校验器无法解读结果；在没有执行错误相伴时按「不重试」处理
    ParseError,
}

/// 校验结论：裁决 + 自由文本备注
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub verdict: ValidationVerdict,
    pub note: Option<String>,
}

/// 结果校验能力
#[async_trait]
pub trait ResultValidator: Send + Sync {
    async fn validate(&self, request: &str, step: &ExecutionStep, result: &str) -> ValidationOutcome;
}

/// 参数修复能力：失败后给出纠正参数，字段并入原参数
#[async_trait]
pub trait ArgumentFixer: Send + Sync {
    async fn suggest(
        &self,
        request: &str,
        tool_name: &str,
        arguments: &Map<String, Value>,
        error: &str,
    ) -> Option<Map<String, Value>>;
}

#[derive(Debug, Deserialize)]
struct VerdictPayload {
    verdict: String,
    #[serde(default)]
    note: Option<String>,
}

/// LLM 结果校验器：模板渲染 + 宽松 JSON 解析
pub struct LlmResultValidator {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl LlmResultValidator {
    pub fn new(llm: Arc<dyn LlmClient>, templates: &PromptTemplates) -> Self {
        Self {
            llm,
            template: templates.validation.clone(),
        }
    }
}

#[async_trait]
impl ResultValidator for LlmResultValidator {
    async fn validate(&self, request: &str, step: &ExecutionStep, result: &str) -> ValidationOutcome {
        let prompt = PromptTemplates::render(
            &self.template,
            &[
                ("request", request),
                ("tool", &step.tool_name),
                ("result", result),
            ],
        );
        let response = match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "validator call failed");
                return ValidationOutcome {
                    verdict: ValidationVerdict::ParseError,
                    note: Some(e),
                };
            }
        };
        parse_verdict(&response)
    }
}

fn parse_verdict(response: &str) -> ValidationOutcome {
    if let Some(block) = extract_json_block(response) {
        if let Ok(payload) = serde_json::from_str::<VerdictPayload>(&block) {
            let verdict = match payload.verdict.to_lowercase().as_str() {
                "ok" | "pass" => ValidationVerdict::Ok,
                "retry" | "fail" => ValidationVerdict::Retry,
                _ => ValidationVerdict::ParseError,
            };
            return ValidationOutcome {
                verdict,
                note: payload.note,
            };
        }
    }
    // 非 JSON 回复：以 OK 开头视为通过，其余一律当作无法解读
    let upper = response.trim().to_uppercase();
    if upper.starts_with("OK") {
        ValidationOutcome {
            verdict: ValidationVerdict::Ok,
            note: None,
        }
    } else {
        ValidationOutcome {
            verdict: ValidationVerdict::ParseError,
            note: Some(response.trim().to_string()),
        }
    }
}

/// LLM 参数修复器
pub struct LlmArgumentFixer {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl LlmArgumentFixer {
    pub fn new(llm: Arc<dyn LlmClient>, templates: &PromptTemplates) -> Self {
        Self {
            llm,
            template: templates.argument_fix.clone(),
        }
    }
}

#[async_trait]
impl ArgumentFixer for LlmArgumentFixer {
    async fn suggest(
        &self,
        request: &str,
        tool_name: &str,
        arguments: &Map<String, Value>,
        error: &str,
    ) -> Option<Map<String, Value>> {
        let args_json = Value::Object(arguments.clone()).to_string();
        let prompt = PromptTemplates::render(
            &self.template,
            &[
                ("request", request),
                ("tool", tool_name),
                ("arguments", &args_json),
                ("error", error),
            ],
        );
        let response = match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "argument fixer call failed");
                return None;
            }
        };
        let block = extract_json_block(&response)?;
        match serde_json::from_str::<Value>(&block) {
            Ok(Value::Object(map)) if !map.is_empty() => Some(map),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_json() {
        let v = parse_verdict(r#"{"verdict": "retry", "note": "empty result"}"#);
        assert_eq!(v.verdict, ValidationVerdict::Retry);
        assert_eq!(v.note.as_deref(), Some("empty result"));
    }

    #[test]
    fn test_parse_verdict_wrapped_in_prose() {
        let v = parse_verdict("Here is my judgement: {\"verdict\": \"ok\"} hope it helps");
        assert_eq!(v.verdict, ValidationVerdict::Ok);
    }

    #[test]
    fn test_parse_verdict_plain_ok() {
        assert_eq!(parse_verdict("OK, looks fine").verdict, ValidationVerdict::Ok);
    }

    #[test]
    fn test_parse_verdict_garbage_is_parse_error() {
        assert_eq!(parse_verdict("no idea").verdict, ValidationVerdict::ParseError);
        assert_eq!(
            parse_verdict(r#"{"verdict": "???"}"#).verdict,
            ValidationVerdict::ParseError
        );
    }
}
