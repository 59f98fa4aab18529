//! 结果成功性启发式判定
//!
//! 这是启发式而非保证：误判由 StepExecutor 的重试环补偿。
//! JSON 结果：显式 success 键优先，其次非空 error 键判失败，再看已知的成功字段组合；
//! 纯文本：失败/成功关键词扫描（韩/英/中），否则非空即成功。

use serde_json::Value;

/// 文本结果中的失败关键词
const FAILURE_TOKENS: &[&str] = &["error", "failed", "failure", "실패", "오류", "失败", "错误"];

/// 文本结果中的成功关键词
const SUCCESS_TOKENS: &[&str] = &[
    "success", "completed", "완료", "저장", "생성", "조회", "完成", "成功", "已保存",
];

/// 判定一条原始结果是否代表成功；tool_name 仅用于日志语境，不影响判定
pub struct SuccessEvaluator;

impl Default for SuccessEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SuccessEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn is_successful(&self, result: &str, tool_name: Option<&str>) -> bool {
        let verdict = match serde_json::from_str::<Value>(result) {
            Ok(Value::Object(map)) => Self::judge_object(&map),
            Ok(Value::Array(items)) => !items.is_empty(),
            Ok(Value::String(s)) => Self::judge_text(&s),
            Ok(Value::Null) => false,
            Ok(_) => true,
            Err(_) => Self::judge_text(result),
        };
        if !verdict {
            tracing::debug!(tool = tool_name.unwrap_or("-"), "result judged unsuccessful");
        }
        verdict
    }

    fn judge_object(map: &serde_json::Map<String, Value>) -> bool {
        // 显式 success 键直接采信
        if let Some(Value::Bool(b)) = map.get("success") {
            return *b;
        }
        // 非空 error 键即失败
        if let Some(err) = map.get("error") {
            let empty = match err {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                _ => false,
            };
            if !empty {
                return false;
            }
        }
        // 已知的成功字段组合
        if map.contains_key("query") && map.contains_key("count") {
            return true;
        }
        if map.contains_key("path") || map.contains_key("message") {
            return true;
        }
        if map.contains_key("date") || map.contains_key("result") {
            return true;
        }
        // 其余非空对象视作真值成功
        !map.is_empty()
    }

    fn judge_text(text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        let lower = trimmed.to_lowercase();
        if FAILURE_TOKENS.iter().any(|t| lower.contains(t)) {
            return false;
        }
        if SUCCESS_TOKENS.iter().any(|t| lower.contains(t)) {
            return true;
        }
        true
    }
}
