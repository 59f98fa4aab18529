//! 工具调用方抽象
//!
//! 管线只依赖 ToolInvoker：按名调用工具、获取目录（名称/描述/参数名）。
//! 传输层（MCP 子进程、stdio 帧、缓存）由实现方负责，对管线不可见。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 工具目录条目：规划 prompt 中展示给 LLM 的最小信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameter_names: Vec<String>,
}

/// 工具调用方：管线与外部工具世界之间的唯一接口
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// 调用指定工具，返回原始结果字符串（可能本身是 JSON）
    async fn call_tool(&self, tool_name: &str, arguments: &Value) -> Result<String, AgentError>;

    /// 当前可用工具目录
    async fn catalog(&self) -> Result<Vec<ToolSpec>, AgentError>;
}
