//! 最终回复合成
//!
//! 把累积的步骤结果抽取成可读内容后请 LLM 写最终回答；
//! 抽不出内容的步骤用领域中立的占位消息。LLM 失败时退回为抽取内容的直接拼接，
//! 回复永远有产出。无工具路径直接带对话历史回答。

use std::sync::Arc;

use crate::core::AgentError;
use crate::engine::args::{extract_meaningful, is_empty_result, no_result_message};
use crate::engine::plan::{ExecutionPlan, StepResults};
use crate::engine::prompts::PromptTemplates;
use crate::llm::LlmClient;
use crate::memory::Message;

pub struct ResponseGenerator {
    llm: Arc<dyn LlmClient>,
    synthesis: String,
    direct: String,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, templates: &PromptTemplates) -> Self {
        Self {
            llm,
            synthesis: templates.synthesis.clone(),
            direct: templates.direct.clone(),
        }
    }

    /// 从步骤结果合成最终回答；总能返回内容
    pub async fn synthesize(
        &self,
        request: &str,
        plan: Option<&ExecutionPlan>,
        step_results: &StepResults,
        errors: &[String],
    ) -> String {
        let digest = digest_results(plan, step_results, errors);
        if step_results.is_empty() && errors.is_empty() {
            // 没有任何素材：退化为直接回答
            if let Ok(answer) = self.respond_directly(request, &[]).await {
                return answer;
            }
        }
        let prompt = PromptTemplates::render(
            &self.synthesis,
            &[("request", request), ("results", &digest)],
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) | Err(_) => {
                tracing::warn!("synthesis call failed, falling back to joined step contents");
                fallback_answer(step_results, errors)
            }
        }
    }

    /// 无工具路径：带对话历史直接回答
    pub async fn respond_directly(
        &self,
        request: &str,
        history: &[Message],
    ) -> Result<String, AgentError> {
        let mut messages = vec![Message::system(self.direct.clone())];
        messages.extend(history.iter().cloned());
        messages.push(Message::user(request));
        self.llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)
    }
}

/// 每步一行的素材摘要；错误单列一段
fn digest_results(
    plan: Option<&ExecutionPlan>,
    step_results: &StepResults,
    errors: &[String],
) -> String {
    let tool_of = |n: u32| {
        plan.and_then(|p| p.steps.iter().find(|s| s.step == n))
            .map(|s| s.tool_name.clone())
    };
    let mut lines: Vec<String> = Vec::new();
    for (step, raw) in step_results {
        let content = if is_empty_result(raw) {
            no_result_message(tool_of(*step).as_deref())
        } else {
            extract_meaningful(raw)
        };
        lines.push(format!("[step {}] {}", step, content));
    }
    if lines.is_empty() {
        lines.push("(no step results)".to_string());
    }
    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors encountered:".to_string());
        for e in errors {
            lines.push(format!("- {}", e));
        }
    }
    lines.join("\n")
}

fn fallback_answer(step_results: &StepResults, errors: &[String]) -> String {
    let mut parts: Vec<String> = step_results
        .values()
        .map(|raw| extract_meaningful(raw))
        .filter(|c| !c.trim().is_empty())
        .collect();
    if parts.is_empty() {
        parts.push(no_result_message(None));
    }
    if !errors.is_empty() {
        parts.push(format!("({} step error(s) occurred)", errors.len()));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn results(pairs: &[(u32, &str)]) -> StepResults {
        pairs.iter().map(|(n, s)| (*n, s.to_string())).collect()
    }

    #[tokio::test]
    async fn test_synthesize_uses_llm_answer() {
        let gen = ResponseGenerator::new(
            Arc::new(ScriptedLlmClient::new(vec!["final answer"])),
            &PromptTemplates::default(),
        );
        let out = gen
            .synthesize("req", None, &results(&[(1, r#"{"content": "x"}"#)]), &[])
            .await;
        assert_eq!(out, "final answer");
    }

    #[tokio::test]
    async fn test_synthesize_falls_back_on_empty_llm_reply() {
        let gen = ResponseGenerator::new(
            Arc::new(ScriptedLlmClient::new(vec![""])),
            &PromptTemplates::default(),
        );
        let out = gen
            .synthesize("req", None, &results(&[(1, r#"{"content": "kept"}"#)]), &[])
            .await;
        assert!(out.contains("kept"));
    }

    #[test]
    fn test_digest_marks_empty_results() {
        let digest = digest_results(None, &results(&[(1, "{}"), (2, "data")]), &[]);
        assert!(digest.contains("no usable result"));
        assert!(digest.contains("[step 2] data"));
    }

    #[test]
    fn test_digest_lists_errors() {
        let digest = digest_results(None, &StepResults::new(), &["step 1: boom".to_string()]);
        assert!(digest.contains("Errors encountered"));
        assert!(digest.contains("boom"));
    }
}
