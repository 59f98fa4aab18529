//! 规划服务：用户请求 -> 执行计划
//!
//! 先查专用工作流模式（命中即整体委派，不再规划）；否则取工具目录、渲染分析 prompt、
//! 请 LLM 产出 {need_tools, plan} JSON。JSON 用宽松方式提取（首个 `{` 到最后一个 `}`），
//! 容忍散文包裹。引用目录外工具的步骤被丢弃，丢空则视同「无需工具」。
//! 交给执行器之前做两件事：自然语言占位符预修复为 `$step_N`、折叠重复步骤。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::AgentError;
use crate::engine::args::ArgumentProcessor;
use crate::engine::patterns::{WorkflowKind, WorkflowPatterns, WorkflowRouter};
use crate::engine::plan::ExecutionPlan;
use crate::engine::prompts::PromptTemplates;
use crate::engine::refiner::PlanRefiner;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::{ToolInvoker, ToolSpec};

/// 规划结论
#[derive(Debug)]
pub enum PlanningOutcome {
    /// 已由专用工作流处理完毕，answer 可直接展示
    Delegated { kind: WorkflowKind, answer: String },
    Plan(ExecutionPlan),
    /// 无需工具（或规划产出不可用）
    NoTools,
}

#[derive(Debug, Deserialize)]
struct PlanningReply {
    #[serde(default)]
    need_tools: bool,
    #[serde(default)]
    plan: Option<ExecutionPlan>,
}

pub struct PlanningService {
    llm: Arc<dyn LlmClient>,
    invoker: Arc<dyn ToolInvoker>,
    router: Option<Arc<dyn WorkflowRouter>>,
    patterns: WorkflowPatterns,
    args: ArgumentProcessor,
    refiner: PlanRefiner,
    template: String,
}

impl PlanningService {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        invoker: Arc<dyn ToolInvoker>,
        router: Option<Arc<dyn WorkflowRouter>>,
        templates: &PromptTemplates,
    ) -> Self {
        Self {
            llm,
            invoker,
            router,
            patterns: WorkflowPatterns::new(),
            args: ArgumentProcessor::new(),
            refiner: PlanRefiner::new(),
            template: templates.analysis.clone(),
        }
    }

    /// 分析请求并产出计划；专用模式命中时整体委派
    pub async fn analyze_request_and_plan(
        &self,
        request: &str,
    ) -> Result<PlanningOutcome, AgentError> {
        if let (Some(router), Some(kind)) = (&self.router, self.patterns.detect(request)) {
            tracing::info!(workflow = kind.name(), "delegating to specialized workflow");
            match router.run(kind, request).await {
                Ok(answer) => return Ok(PlanningOutcome::Delegated { kind, answer }),
                Err(e) => {
                    // 委派失败退回通用规划
                    tracing::warn!(workflow = kind.name(), error = %e, "workflow failed, planning normally");
                }
            }
        }

        let catalog = self.invoker.catalog().await?;
        let prompt = PromptTemplates::render(
            &self.template,
            &[("request", request), ("tools", &render_catalog(&catalog))],
        );
        let response = self
            .llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(AgentError::LlmError)?;

        let Some(block) = extract_json_block(&response) else {
            tracing::warn!("planner reply contained no JSON object");
            return Ok(PlanningOutcome::NoTools);
        };
        let reply: PlanningReply = match serde_json::from_str(&block) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "planner reply JSON did not parse");
                return Ok(PlanningOutcome::NoTools);
            }
        };

        if !reply.need_tools {
            return Ok(PlanningOutcome::NoTools);
        }
        let Some(mut plan) = reply.plan else {
            return Ok(PlanningOutcome::NoTools);
        };

        // 目录外的工具名一律丢弃
        let known: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        plan.steps.retain(|s| {
            let keep = known.contains(&s.tool_name.as_str());
            if !keep {
                tracing::warn!(step = s.step, tool = %s.tool_name, "dropping step with unknown tool");
            }
            keep
        });
        if plan.steps.is_empty() {
            return Ok(PlanningOutcome::NoTools);
        }

        // 预修复：把自然语言引用规范化成 $step_N，降低首轮失败率
        for step in &mut plan.steps {
            step.arguments = self.args.pre_repair(step.step, &step.arguments);
        }

        Ok(PlanningOutcome::Plan(self.refiner.refine(&plan)))
    }
}

fn render_catalog(catalog: &[ToolSpec]) -> String {
    catalog
        .iter()
        .map(|t| {
            if t.parameter_names.is_empty() {
                format!("- {}: {}", t.name, t.description)
            } else {
                format!(
                    "- {}: {} (params: {})",
                    t.name,
                    t.description,
                    t.parameter_names.join(", ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 宽松 JSON 提取：首个 `{` 到最后一个 `}`（含）
pub fn extract_json_block(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}
