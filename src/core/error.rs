//! Agent 错误类型
//!
//! 步骤级失败（工具异常、显式失败）由 StepExecutor 在重试预算内就地恢复，
//! 这里只保留需要向上传播的硬错误。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（工具、解析、LLM、配置、持久化等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    /// 计划历史等落盘状态读写失败
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::PersistenceError(e.to_string())
    }
}
