//! Weaver - 终端智能体执行管线
//!
//! 把一次自然语言请求编排为有界、可重试、带跨步骤依赖的工具调用序列，并合成最终回答。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **engine**: 执行管线（规划、占位符替换、单步状态机、重复计划检测、顶层治理）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 对话历史与持久化
//! - **observability**: 日志初始化
//! - **tools**: 工具调用方抽象、进程内注册表与内建工具

pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
