//! Mock / Scripted LLM 客户端（用于测试与无 API Key 场景）

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::Message;

/// Mock 客户端：固定回答「不需要工具」，让管线走直接回复路径
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::memory::Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!(
            r#"{{"need_tools": false, "reply": "Echo from Mock: {}"}}"#,
            last_user
        ))
    }
}

/// Scripted 客户端：按调用顺序弹出预置回复，耗尽后返回最后一条
///
/// 规划 / 校验 / 修复 / 合成都会消费一条，测试里按调用顺序排好即可。
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            last: Mutex::new(String::new()),
        }
    }

    pub fn push(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(reply.into());
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        let mut q = self.replies.lock().unwrap();
        match q.pop_front() {
            Some(r) => {
                *self.last.lock().unwrap() = r.clone();
                Ok(r)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}
