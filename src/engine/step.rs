//! 步骤执行器：单步状态机
//!
//! AwaitConfirm -> {Skip | Modify | Cancel | Proceed}；
//! Proceed -> Execute -> Validate -> {Done | Retry | GiveUp}。
//!
//! 重试触发优先级固定：执行异常 > 显式 success:false > 校验器裁决；
//! parse_error 豁免只在没有更高优先级信号时生效。未配置校验器时，
//! 第三档由 SuccessEvaluator 启发式顶替。连续两次出现完全相同的执行错误串
//! 立即放弃剩余重试，避免对系统性故障反复烧 LLM 调用。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::engine::args::ArgumentProcessor;
use crate::engine::confirm::{ConfirmDecision, ConfirmGate};
use crate::engine::plan::{ExecutionStep, StepResults};
use crate::engine::success::SuccessEvaluator;
use crate::engine::validate::{ArgumentFixer, ResultValidator, ValidationVerdict};
use crate::tools::ToolInvoker;

/// 默认的单步重试上限
pub const DEFAULT_MAX_STEP_RETRIES: u32 = 2;

/// 单步执行结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 结果已写入 step_results
    Done,
    /// 用户跳过：按已完成对待，不产生结果
    Skipped,
    /// 用户取消：放弃整个计划
    Cancelled,
    /// 用户改写请求：放弃当前步骤序列，携带替换请求
    Modify(String),
    /// 重试耗尽或同错误连续出现
    Failed { error: String },
}

/// 本次尝试的重试判定
enum Verdict {
    Accept,
    Retry(String),
}

pub struct StepExecutor {
    invoker: Arc<dyn ToolInvoker>,
    gate: Arc<dyn ConfirmGate>,
    validator: Option<Arc<dyn ResultValidator>>,
    fixer: Option<Arc<dyn ArgumentFixer>>,
    args: ArgumentProcessor,
    success: SuccessEvaluator,
    max_step_retries: u32,
    cancel: CancellationToken,
}

impl StepExecutor {
    pub fn new(
        invoker: Arc<dyn ToolInvoker>,
        gate: Arc<dyn ConfirmGate>,
        validator: Option<Arc<dyn ResultValidator>>,
        fixer: Option<Arc<dyn ArgumentFixer>>,
        max_step_retries: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            invoker,
            gate,
            validator,
            fixer,
            args: ArgumentProcessor::new(),
            success: SuccessEvaluator::new(),
            max_step_retries,
            cancel,
        }
    }

    /// 执行一个步骤；成功时把原始结果写入 step_results[step.step]。
    /// 重试期间参数修复会就地改写 step.arguments。
    pub async fn execute_step(
        &self,
        step: &mut ExecutionStep,
        step_results: &mut StepResults,
        request: &str,
    ) -> StepOutcome {
        if self.cancel.is_cancelled() {
            return StepOutcome::Cancelled;
        }

        match self.gate.confirm(step).await {
            ConfirmDecision::Proceed => {}
            ConfirmDecision::Skip => {
                tracing::info!(step = step.step, tool = %step.tool_name, "step skipped by user");
                return StepOutcome::Skipped;
            }
            ConfirmDecision::Cancel => return StepOutcome::Cancelled,
            ConfirmDecision::Modify(replacement) => return StepOutcome::Modify(replacement),
        }

        let mut last_exec_error: Option<String> = None;

        for attempt in 0..=self.max_step_retries {
            if self.cancel.is_cancelled() {
                return StepOutcome::Cancelled;
            }

            let processed = self.args.process(&step.arguments, step_results);
            for key in &processed.unresolved {
                tracing::warn!(
                    step = step.step,
                    key = %key,
                    "step reference could not be resolved; passing the original value through"
                );
            }
            let arguments = serde_json::Value::Object(processed.arguments);

            let (raw, exec_error) = match self.invoker.call_tool(&step.tool_name, &arguments).await {
                Ok(raw) => (raw, None),
                Err(e) => {
                    let msg = e.to_string();
                    // 异常不向上传播：转为合成错误结果参与校验与重试
                    let synthetic = serde_json::json!({ "error": msg }).to_string();
                    (synthetic, Some(msg))
                }
            };

            match self.judge(request, step, &raw, exec_error.as_deref()).await {
                Verdict::Accept => {
                    step_results.insert(step.step, raw);
                    return StepOutcome::Done;
                }
                Verdict::Retry(reason) => {
                    // 每次出现打印一次；同一尝试内多个信号命中同一错误也只打印这一条
                    tracing::warn!(
                        step = step.step,
                        tool = %step.tool_name,
                        attempt = attempt + 1,
                        error = %reason,
                        "step attempt failed"
                    );

                    if attempt == self.max_step_retries {
                        return StepOutcome::Failed { error: reason };
                    }

                    // 同一执行错误连续出现：系统性故障，提前放弃
                    if let (Some(prev), Some(cur)) = (&last_exec_error, &exec_error) {
                        if prev == cur {
                            tracing::warn!(
                                step = step.step,
                                "identical execution error repeated; aborting retries"
                            );
                            return StepOutcome::Failed { error: reason };
                        }
                    }

                    if let (Some(err), Some(fixer)) = (&exec_error, &self.fixer) {
                        if let Some(fixed) = fixer
                            .suggest(request, &step.tool_name, &step.arguments, err)
                            .await
                        {
                            for (k, v) in fixed {
                                step.arguments.insert(k, v);
                            }
                            tracing::info!(step = step.step, "arguments repaired before retry");
                        }
                    }

                    last_exec_error = exec_error;
                }
            }
        }

        // 循环总在 Accept / 预算耗尽 / 提前放弃处返回
        StepOutcome::Failed {
            error: "retry budget exhausted".to_string(),
        }
    }

    /// 三路信号合成一次判定，优先级固定（见模块注释）
    async fn judge(
        &self,
        request: &str,
        step: &ExecutionStep,
        raw: &str,
        exec_error: Option<&str>,
    ) -> Verdict {
        // 1. 执行异常总是重试
        if let Some(err) = exec_error {
            return Verdict::Retry(err.to_string());
        }

        // 2. 显式 success:false 总是重试
        if let Some(detail) = explicit_failure(raw) {
            return Verdict::Retry(format!("step {}: {}", step.step, detail));
        }

        // 3. 校验器裁决；parse_error 在无执行错误时按「不重试」处理
        if let Some(validator) = &self.validator {
            let outcome = validator.validate(request, step, raw).await;
            return match outcome.verdict {
                ValidationVerdict::Ok | ValidationVerdict::ParseError => Verdict::Accept,
                ValidationVerdict::Retry => Verdict::Retry(
                    outcome
                        .note
                        .unwrap_or_else(|| "validator requested retry".to_string()),
                ),
            };
        }

        // 无校验器：启发式顶替第三档
        if self.success.is_successful(raw, Some(&step.tool_name)) {
            Verdict::Accept
        } else {
            Verdict::Retry(format!(
                "step {}: result judged unsuccessful",
                step.step
            ))
        }
    }
}

/// 结果是 JSON 对象且带显式 success:false 时返回失败描述
fn explicit_failure(raw: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(raw).ok()?;
    let map = value.as_object()?;
    if map.get("success") != Some(&serde_json::Value::Bool(false)) {
        return None;
    }
    let detail = match map.get("error") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "tool reported success=false".to_string(),
    };
    Some(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use crate::core::AgentError;
    use crate::engine::confirm::AutoGate;
    use crate::engine::validate::ValidationOutcome;
    use crate::tools::ToolSpec;

    struct FlakyInvoker {
        calls: AtomicU32,
        fail_times: u32,
        distinct_errors: bool,
    }

    #[async_trait]
    impl ToolInvoker for FlakyInvoker {
        async fn call_tool(&self, _tool: &str, _args: &Value) -> Result<String, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                let msg = if self.distinct_errors {
                    format!("transient failure #{}", n)
                } else {
                    "connection refused".to_string()
                };
                Err(AgentError::ToolExecutionFailed(msg))
            } else {
                Ok(r#"{"content": "recovered"}"#.to_string())
            }
        }

        async fn catalog(&self) -> Result<Vec<ToolSpec>, AgentError> {
            Ok(Vec::new())
        }
    }

    struct CountingFixer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ArgumentFixer for CountingFixer {
        async fn suggest(
            &self,
            _request: &str,
            _tool: &str,
            _arguments: &Map<String, Value>,
            _error: &str,
        ) -> Option<Map<String, Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut fixed = Map::new();
            fixed.insert("repaired".to_string(), Value::Bool(true));
            Some(fixed)
        }
    }

    fn step() -> ExecutionStep {
        ExecutionStep {
            step: 1,
            description: "call".to_string(),
            tool_name: "flaky".to_string(),
            arguments: Map::new(),
            confirm_message: String::new(),
        }
    }

    fn executor(invoker: Arc<dyn ToolInvoker>, fixer: Option<Arc<dyn ArgumentFixer>>) -> StepExecutor {
        StepExecutor::new(
            invoker,
            Arc::new(AutoGate),
            None,
            fixer,
            DEFAULT_MAX_STEP_RETRIES,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_always_failing_tool_three_attempts() {
        let invoker = Arc::new(FlakyInvoker {
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
            distinct_errors: true,
        });
        let fixer = Arc::new(CountingFixer {
            calls: AtomicU32::new(0),
        });
        let exec = executor(invoker.clone(), Some(fixer.clone()));
        let mut s = step();
        let mut results = StepResults::new();

        let outcome = exec.execute_step(&mut s, &mut results, "req").await;
        assert!(matches!(outcome, StepOutcome::Failed { .. }));
        // 1 次首发 + 2 次重试
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 3);
        // 每次重试前各问一次修复器
        assert_eq!(fixer.calls.load(Ordering::SeqCst), 2);
        // 修复字段已并入步骤参数
        assert_eq!(s.arguments.get("repaired"), Some(&Value::Bool(true)));
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_identical_error_aborts_early() {
        let invoker = Arc::new(FlakyInvoker {
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
            distinct_errors: false,
        });
        let fixer = Arc::new(CountingFixer {
            calls: AtomicU32::new(0),
        });
        let exec = executor(invoker.clone(), Some(fixer.clone()));
        let mut s = step();
        let mut results = StepResults::new();

        let outcome = exec.execute_step(&mut s, &mut results, "req").await;
        assert!(matches!(outcome, StepOutcome::Failed { .. }));
        // 第二次出现同一错误串后立即放弃：共 2 次调用、1 次修复咨询
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fixer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let invoker = Arc::new(FlakyInvoker {
            calls: AtomicU32::new(0),
            fail_times: 1,
            distinct_errors: true,
        });
        let exec = executor(invoker, None);
        let mut s = step();
        let mut results = StepResults::new();

        let outcome = exec.execute_step(&mut s, &mut results, "req").await;
        assert_eq!(outcome, StepOutcome::Done);
        assert_eq!(results.get(&1).unwrap(), r#"{"content": "recovered"}"#);
    }

    struct FixedResultInvoker {
        result: String,
    }

    #[async_trait]
    impl ToolInvoker for FixedResultInvoker {
        async fn call_tool(&self, _tool: &str, _args: &Value) -> Result<String, AgentError> {
            Ok(self.result.clone())
        }

        async fn catalog(&self) -> Result<Vec<ToolSpec>, AgentError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_explicit_success_false_forces_retry() {
        let invoker = Arc::new(FixedResultInvoker {
            result: r#"{"success": false, "error": "quota"}"#.to_string(),
        });
        let exec = executor(invoker, None);
        let mut s = step();
        let mut results = StepResults::new();

        let outcome = exec.execute_step(&mut s, &mut results, "req").await;
        assert!(matches!(outcome, StepOutcome::Failed { .. }));
        assert!(results.is_empty());
    }

    struct FixedVerdictValidator {
        verdict: ValidationVerdict,
    }

    #[async_trait]
    impl ResultValidator for FixedVerdictValidator {
        async fn validate(
            &self,
            _request: &str,
            _step: &ExecutionStep,
            _result: &str,
        ) -> ValidationOutcome {
            ValidationOutcome {
                verdict: self.verdict,
                note: None,
            }
        }
    }

    #[tokio::test]
    async fn test_parse_error_without_exec_error_accepts() {
        // 文本里带 error 字样，启发式会判失败；校验器 parse_error 且无执行错误 => 不重试
        let invoker = Arc::new(FixedResultInvoker {
            result: "error: cannot interpret device reply".to_string(),
        });
        let exec = StepExecutor::new(
            invoker,
            Arc::new(AutoGate),
            Some(Arc::new(FixedVerdictValidator {
                verdict: ValidationVerdict::ParseError,
            })),
            None,
            DEFAULT_MAX_STEP_RETRIES,
            CancellationToken::new(),
        );
        let mut s = step();
        let mut results = StepResults::new();
        let outcome = exec.execute_step(&mut s, &mut results, "req").await;
        assert_eq!(outcome, StepOutcome::Done);
    }

    #[tokio::test]
    async fn test_validator_retry_forces_retry() {
        let invoker = Arc::new(FixedResultInvoker {
            result: r#"{"content": "thin"}"#.to_string(),
        });
        let exec = StepExecutor::new(
            invoker,
            Arc::new(AutoGate),
            Some(Arc::new(FixedVerdictValidator {
                verdict: ValidationVerdict::Retry,
            })),
            None,
            1,
            CancellationToken::new(),
        );
        let mut s = step();
        let mut results = StepResults::new();
        let outcome = exec.execute_step(&mut s, &mut results, "req").await;
        assert!(matches!(outcome, StepOutcome::Failed { .. }));
    }

    struct SkipGate;

    #[async_trait]
    impl ConfirmGate for SkipGate {
        async fn confirm(&self, _step: &ExecutionStep) -> ConfirmDecision {
            ConfirmDecision::Skip
        }
    }

    #[tokio::test]
    async fn test_skip_completes_without_executing() {
        let invoker = Arc::new(FlakyInvoker {
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
            distinct_errors: true,
        });
        let exec = StepExecutor::new(
            invoker.clone(),
            Arc::new(SkipGate),
            None,
            None,
            DEFAULT_MAX_STEP_RETRIES,
            CancellationToken::new(),
        );
        let mut s = step();
        let mut results = StepResults::new();
        let outcome = exec.execute_step(&mut s, &mut results, "req").await;
        assert_eq!(outcome, StepOutcome::Skipped);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }
}
