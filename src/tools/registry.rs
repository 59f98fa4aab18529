//! 工具注册表
//!
//! 进程内工具实现 Tool trait（name / description / parameter_names / execute），
//! 由 ToolRegistry 按名注册与查找；RegistryInvoker 在调用时加超时并统一转 AgentError。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 进程内工具 trait：名称、描述（供 LLM 理解）、参数名、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划步骤中的 tool_name 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数名列表（供规划 prompt 展示；默认无参数）
    fn parameter_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / execute / tool_names
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 目录视图：(name, description, parameter_names)
    pub fn tool_specs(&self) -> Vec<crate::tools::ToolSpec> {
        self.tools
            .values()
            .map(|tool| crate::tools::ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameter_names: tool.parameter_names(),
            })
            .collect()
    }
}
