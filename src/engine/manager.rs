//! 执行管理器：一次 计划 -> 逐步执行 -> 合成回复 的完整过程
//!
//! 步骤严格按 step 升序执行；任一步骤终止性失败后立即停止（后续步骤的依赖
//! 无从解析）。无论走到哪一步，ResponseGenerator 都会基于已有结果运行；
//! 收尾再对结果整体做一次残留错误扫描并入返回的 errors。
//! exec_errors 单独返回：顶层治理只认执行级错误（见 query.rs）。

use crate::engine::evaluator::extract_errors;
use crate::engine::plan::{ExecutionPlan, StepResults};
use crate::engine::respond::ResponseGenerator;
use crate::engine::step::{StepExecutor, StepOutcome};

/// 一次计划执行的完整产出
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub response: String,
    pub step_results: StepResults,
    /// 执行级错误 + 残留错误扫描的并集
    pub errors: Vec<String>,
    /// 仅执行级错误（重试耗尽 / 同错误提前放弃）
    pub exec_errors: Vec<String>,
    pub cancelled: bool,
    /// 用户在确认门改写了请求
    pub modify_request: Option<String>,
}

pub struct ExecutionManager {
    executor: StepExecutor,
    responder: ResponseGenerator,
}

impl ExecutionManager {
    pub fn new(executor: StepExecutor, responder: ResponseGenerator) -> Self {
        Self { executor, responder }
    }

    pub async fn execute_interactive_plan(
        &self,
        plan: &ExecutionPlan,
        original_prompt: &str,
    ) -> TurnOutcome {
        let mut outcome = TurnOutcome::default();
        let mut steps = plan.steps.clone();

        for step in &mut steps {
            match self
                .executor
                .execute_step(step, &mut outcome.step_results, original_prompt)
                .await
            {
                StepOutcome::Done | StepOutcome::Skipped => {}
                StepOutcome::Cancelled => {
                    tracing::info!("plan cancelled by user");
                    outcome.cancelled = true;
                    break;
                }
                StepOutcome::Modify(replacement) => {
                    tracing::info!("user replaced the request at the confirm gate");
                    outcome.modify_request = Some(replacement);
                    break;
                }
                StepOutcome::Failed { error } => {
                    outcome.exec_errors.push(error);
                    break;
                }
            }
        }

        outcome.errors = outcome.exec_errors.clone();
        // 残留错误：成功落盘的结果里也可能带 error 内容
        for residual in extract_errors(&outcome.step_results) {
            if !outcome.errors.contains(&residual) {
                outcome.errors.push(residual);
            }
        }

        outcome.response = self
            .responder
            .synthesize(original_prompt, Some(plan), &outcome.step_results, &outcome.errors)
            .await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    use crate::core::AgentError;
    use crate::engine::confirm::AutoGate;
    use crate::engine::plan::ExecutionStep;
    use crate::engine::prompts::PromptTemplates;
    use crate::engine::step::DEFAULT_MAX_STEP_RETRIES;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{ToolInvoker, ToolSpec};

    /// step1 成功、step2 永远失败的调用方；记录调用过的工具名
    struct HalfBrokenInvoker {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ToolInvoker for HalfBrokenInvoker {
        async fn call_tool(&self, tool: &str, _args: &Value) -> Result<String, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match tool {
                "good" => Ok(r#"{"content": "fine"}"#.to_string()),
                _ => Err(AgentError::ToolExecutionFailed(format!("broken #{}", n))),
            }
        }

        async fn catalog(&self) -> Result<Vec<ToolSpec>, AgentError> {
            Ok(Vec::new())
        }
    }

    fn step(n: u32, tool: &str) -> ExecutionStep {
        ExecutionStep {
            step: n,
            description: format!("step {}", n),
            tool_name: tool.to_string(),
            arguments: serde_json::Map::new(),
            confirm_message: String::new(),
        }
    }

    fn manager(invoker: Arc<dyn ToolInvoker>) -> ExecutionManager {
        let templates = PromptTemplates::default();
        let executor = StepExecutor::new(
            invoker,
            Arc::new(AutoGate),
            None,
            None,
            DEFAULT_MAX_STEP_RETRIES,
            CancellationToken::new(),
        );
        let responder = ResponseGenerator::new(
            Arc::new(ScriptedLlmClient::new(vec!["synthesized"])),
            &templates,
        );
        ExecutionManager::new(executor, responder)
    }

    #[tokio::test]
    async fn test_failure_stops_later_steps() {
        let invoker = Arc::new(HalfBrokenInvoker {
            calls: AtomicU32::new(0),
        });
        let mgr = manager(invoker.clone());
        let plan = ExecutionPlan {
            description: "d".to_string(),
            steps: vec![step(1, "good"), step(2, "bad"), step(3, "good")],
        };

        let outcome = mgr.execute_interactive_plan(&plan, "req").await;
        assert_eq!(outcome.exec_errors.len(), 1);
        // step1 成功 1 次 + step2 失败 3 次；step3 不执行
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.step_results.len(), 1);
        // 回复仍然生成
        assert_eq!(outcome.response, "synthesized");
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let invoker = Arc::new(HalfBrokenInvoker {
            calls: AtomicU32::new(0),
        });
        let mgr = manager(invoker);
        let plan = ExecutionPlan {
            description: "d".to_string(),
            steps: vec![step(1, "good"), step(2, "good")],
        };
        let outcome = mgr.execute_interactive_plan(&plan, "req").await;
        assert!(outcome.exec_errors.is_empty());
        assert_eq!(outcome.step_results.len(), 2);
        assert!(!outcome.cancelled);
    }
}
