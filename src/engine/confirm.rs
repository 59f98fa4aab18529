//! 步骤确认门
//!
//! 交互模式下每步执行前征求用户决定：proceed / skip / modify / cancel；
//! 全自动模式直接放行。决定以能力接口注入，StepExecutor 不感知终端。

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::plan::ExecutionStep;

/// 用户对单个步骤的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmDecision {
    Proceed,
    /// 不执行，按已完成对待
    Skip,
    /// 放弃本计划，换用新的用户请求
    Modify(String),
    /// 放弃整个计划
    Cancel,
}

/// 确认能力
#[async_trait]
pub trait ConfirmGate: Send + Sync {
    async fn confirm(&self, step: &ExecutionStep) -> ConfirmDecision;
}

/// 全自动模式：一律放行
#[derive(Debug, Default)]
pub struct AutoGate;

#[async_trait]
impl ConfirmGate for AutoGate {
    async fn confirm(&self, _step: &ExecutionStep) -> ConfirmDecision {
        ConfirmDecision::Proceed
    }
}

/// 终端确认：展示确认消息、工具名与参数，读取一行决定
#[derive(Debug, Default)]
pub struct TerminalGate;

#[async_trait]
impl ConfirmGate for TerminalGate {
    async fn confirm(&self, step: &ExecutionStep) -> ConfirmDecision {
        let message = if step.confirm_message.is_empty() {
            &step.description
        } else {
            &step.confirm_message
        };
        println!();
        println!("[step {}] {}", step.step, message);
        println!(
            "  tool: {}  args: {}",
            step.tool_name,
            Value::Object(step.arguments.clone())
        );

        loop {
            println!("  proceed [p] / skip [s] / modify [m] / cancel [c]?");
            let line = match read_line().await {
                Some(l) => l,
                None => return ConfirmDecision::Cancel,
            };
            match line.trim().to_lowercase().as_str() {
                "" | "p" | "proceed" | "y" | "yes" => return ConfirmDecision::Proceed,
                "s" | "skip" => return ConfirmDecision::Skip,
                "c" | "cancel" | "n" | "no" => return ConfirmDecision::Cancel,
                "m" | "modify" => {
                    println!("  new request:");
                    match read_line().await {
                        Some(replacement) if !replacement.trim().is_empty() => {
                            return ConfirmDecision::Modify(replacement.trim().to_string());
                        }
                        _ => continue,
                    }
                }
                other => {
                    println!("  unrecognized: {}", other);
                }
            }
        }
    }
}

async fn read_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok().map(|_| line)
    })
    .await
    .ok()
    .flatten()
}
