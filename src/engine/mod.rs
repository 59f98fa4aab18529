//! 执行引擎：规划 -> 逐步执行 -> 合成回复 的编排管线
//!
//! - **plan**: 计划数据模型与内容哈希
//! - **args**: 跨步骤占位符替换与内容抽取
//! - **success**: 结果成功性启发式
//! - **history / evaluator**: 计划哈希持久历史与重复检测
//! - **refiner**: 计划内重复步骤折叠
//! - **confirm / validate**: 确认门与 LLM 校验/参数修复能力
//! - **step**: 单步状态机（重试、修复、提前放弃）
//! - **patterns / planning**: 专用工作流识别与规划服务
//! - **respond / manager / query**: 回复合成、单次计划执行、顶层治理

pub mod args;
pub mod confirm;
pub mod evaluator;
pub mod history;
pub mod manager;
pub mod patterns;
pub mod plan;
pub mod planning;
pub mod prompts;
pub mod query;
pub mod refiner;
pub mod respond;
pub mod step;
pub mod success;
pub mod validate;

pub use args::{ArgumentProcessor, PlaceholderOutcome, ProcessedArguments};
pub use confirm::{AutoGate, ConfirmDecision, ConfirmGate, TerminalGate};
pub use evaluator::{PlanAssessment, PlanEvaluator};
pub use history::{default_history_path, PlanHistoryManager, HISTORY_CAP};
pub use manager::{ExecutionManager, TurnOutcome};
pub use patterns::{WorkflowKind, WorkflowPatterns, WorkflowRouter};
pub use plan::{plan_hash, ExecutionPlan, ExecutionStep, StepResults};
pub use planning::{PlanningOutcome, PlanningService};
pub use prompts::PromptTemplates;
pub use query::{QueryProcessor, QueryReport, StopReason, DEFAULT_MAX_ITERATIONS};
pub use refiner::PlanRefiner;
pub use respond::ResponseGenerator;
pub use step::{StepExecutor, StepOutcome, DEFAULT_MAX_STEP_RETRIES};
pub use success::SuccessEvaluator;
pub use validate::{
    ArgumentFixer, LlmArgumentFixer, LlmResultValidator, ResultValidator, ValidationOutcome,
    ValidationVerdict,
};
