//! 查询处理器:顶层有界迭代治理
//!
//! 面对非确定性的 LLM，这一层保证终止：迭代上限（默认 30）、重复计划即停、
//! 错误判定只认执行级信号。LLM 自己「觉得结果不够好」不触发重跑——
//! 没有真实执行错误时 has_errors 一律为 false。
//! 重复计划与迭代耗尽都以警告收尾，不是进程错误；对话状态保持可用。

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::engine::evaluator::PlanEvaluator;
use crate::engine::manager::ExecutionManager;
use crate::engine::planning::{PlanningOutcome, PlanningService};
use crate::engine::prompts::PromptTemplates;
use crate::engine::respond::ResponseGenerator;
use crate::memory::{ConversationMemory, Message};

/// 顶层迭代上限
pub const DEFAULT_MAX_ITERATIONS: u32 = 30;

/// 本轮查询的收尾方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 正常完成（无执行错误，或请求已被委派/直接回答）
    Completed,
    /// 追加计划与已执行过的计划重复
    DuplicatePlan,
    /// 迭代预算耗尽
    IterationBudget,
    /// 用户取消
    Cancelled,
}

/// 一轮查询的结果
#[derive(Debug)]
pub struct QueryReport {
    pub response: String,
    pub iterations: u32,
    pub stop_reason: StopReason,
}

pub struct QueryProcessor {
    planning: PlanningService,
    manager: ExecutionManager,
    evaluator: PlanEvaluator,
    responder: ResponseGenerator,
    conversation: ConversationMemory,
    replan_template: String,
    max_iterations: u32,
    cancel: CancellationToken,
}

impl QueryProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        planning: PlanningService,
        manager: ExecutionManager,
        evaluator: PlanEvaluator,
        responder: ResponseGenerator,
        conversation: ConversationMemory,
        templates: &PromptTemplates,
        max_iterations: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            planning,
            manager,
            evaluator,
            responder,
            conversation,
            replan_template: templates.replan.clone(),
            max_iterations,
            cancel,
        }
    }

    pub fn conversation(&self) -> &ConversationMemory {
        &self.conversation
    }

    /// 处理一次用户请求，直到成功、重复、取消或预算耗尽
    pub async fn process_query(&mut self, request: &str) -> Result<QueryReport, AgentError> {
        self.conversation.push(Message::user(request));

        let mut input = request.to_string();
        let mut last_response = String::new();
        let mut iterations = 0;

        let stop_reason = loop {
            if iterations >= self.max_iterations {
                tracing::warn!(
                    max_iterations = self.max_iterations,
                    "iteration budget reached, stopping this turn"
                );
                break StopReason::IterationBudget;
            }
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            iterations += 1;
            tracing::debug!(iteration = iterations, input = %input, "processing iteration");

            match self.planning.analyze_request_and_plan(&input).await? {
                PlanningOutcome::Delegated { kind, answer } => {
                    tracing::info!(workflow = kind.name(), "request handled by workflow");
                    last_response = answer;
                    break StopReason::Completed;
                }
                PlanningOutcome::NoTools => {
                    // 历史不含本轮刚入列的 user 消息，respond_directly 会自己追加请求
                    let prior = &self.conversation.messages()[..self.conversation.len() - 1];
                    last_response = self.responder.respond_directly(&input, prior).await?;
                    break StopReason::Completed;
                }
                PlanningOutcome::Plan(plan) => {
                    let outcome = self.manager.execute_interactive_plan(&plan, request).await;

                    // 登记已执行计划并做一次启发式评估（错误仅用于日志与追加规划的上下文）
                    let assessment = self.evaluator.evaluate(&plan, &outcome.step_results)?;
                    tracing::debug!(
                        duplicate = assessment.plan_duplicate,
                        heuristic_errors = assessment.errors.len(),
                        "plan assessed"
                    );

                    if outcome.cancelled {
                        last_response = outcome.response;
                        break StopReason::Cancelled;
                    }
                    if let Some(replacement) = outcome.modify_request {
                        input = replacement;
                        continue;
                    }

                    last_response = outcome.response;

                    // 严格错误判定：只有执行级错误算数
                    if outcome.exec_errors.is_empty() {
                        break StopReason::Completed;
                    }

                    let enhanced = PromptTemplates::render(
                        &self.replan_template,
                        &[("request", request), ("errors", &outcome.errors.join("\n"))],
                    );
                    match self.planning.analyze_request_and_plan(&enhanced).await? {
                        PlanningOutcome::Plan(follow_up) => {
                            if self.evaluator.is_duplicate(&follow_up) {
                                tracing::warn!(
                                    "follow-up plan duplicates an already-tried plan, stopping"
                                );
                                break StopReason::DuplicatePlan;
                            }
                            input = format!(
                                "execute this follow-up plan: {}",
                                follow_up.description
                            );
                        }
                        PlanningOutcome::Delegated { answer, .. } => {
                            last_response = answer;
                            break StopReason::Completed;
                        }
                        PlanningOutcome::NoTools => {
                            // 有错误但没有追加计划：换个思路继续
                            input = format!(
                                "the previous attempt failed ({}); try another approach for: {}",
                                outcome.exec_errors.join("; "),
                                request
                            );
                        }
                    }
                }
            }
        };

        if last_response.is_empty() {
            last_response = match stop_reason {
                StopReason::IterationBudget => {
                    "Stopped after reaching the iteration limit without a final answer.".to_string()
                }
                StopReason::Cancelled => "Cancelled.".to_string(),
                _ => String::new(),
            };
        }
        self.conversation.push(Message::assistant(last_response.clone()));

        Ok(QueryReport {
            response: last_response,
            iterations,
            stop_reason,
        })
    }
}
