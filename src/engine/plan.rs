//! 执行计划数据模型与内容哈希
//!
//! ExecutionPlan 是值对象：重复检测用的身份是确定性内容哈希（排序键序列化 + sha256），
//! 而不是对象身份。confirm_message 只影响交互展示，不参与哈希。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// 计划中的单个步骤；重试期间参数修复会就地改写 arguments，其余字段不变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStep {
    pub step: u32,
    #[serde(default)]
    pub description: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub confirm_message: String,
}

/// 一次规划产出的有序步骤列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
}

/// 步骤号 -> 原始结果字符串（可能本身是 JSON）；由当前一次计划执行独占持有
pub type StepResults = BTreeMap<u32, String>;

/// 计划内容哈希：对 {description, steps[].{step, description, tool_name, arguments}}
/// 的排序键序列化取 sha256，输出小写十六进制。
///
/// 键序在此显式排序（不依赖 serde_json 的底层 Map 实现），
/// 因此相等计划（按此序列化）必得相等哈希，任一字段差异都会改变哈希。
pub fn plan_hash(plan: &ExecutionPlan) -> String {
    let mut canonical = String::new();
    canonical.push_str("{\"description\":");
    canonical.push_str(&Value::from(plan.description.clone()).to_string());
    canonical.push_str(",\"steps\":[");
    for (i, s) in plan.steps.iter().enumerate() {
        if i > 0 {
            canonical.push(',');
        }
        canonical.push_str(&format!(
            "{{\"arguments\":{},\"description\":{},\"step\":{},\"tool_name\":{}}}",
            canonical_value(&Value::Object(s.arguments.clone())),
            Value::from(s.description.clone()),
            s.step,
            Value::from(s.tool_name.clone()),
        ));
    }
    canonical.push_str("]}");

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// 键按字典序排序的紧凑 JSON 序列化
fn canonical_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let entries: BTreeMap<&String, &Value> = map.iter().collect();
            let inner: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::from(k.clone()), canonical_value(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_value).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> ExecutionPlan {
        ExecutionPlan {
            description: "save a note".to_string(),
            steps: vec![ExecutionStep {
                step: 1,
                description: "write file".to_string(),
                tool_name: "write_file".to_string(),
                arguments: serde_json::from_str(r#"{"path": "note.txt", "content": "hi"}"#).unwrap(),
                confirm_message: "write note.txt?".to_string(),
            }],
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let plan = sample_plan();
        assert_eq!(plan_hash(&plan), plan_hash(&plan));
    }

    #[test]
    fn test_hash_sensitive_to_fields() {
        let base = plan_hash(&sample_plan());

        let mut p = sample_plan();
        p.description = "save another note".to_string();
        assert_ne!(plan_hash(&p), base);

        let mut p = sample_plan();
        p.steps[0].tool_name = "append_file".to_string();
        assert_ne!(plan_hash(&p), base);

        let mut p = sample_plan();
        p.steps[0]
            .arguments
            .insert("mode".to_string(), Value::from("append"));
        assert_ne!(plan_hash(&p), base);

        let mut p = sample_plan();
        p.steps[0].description = "write the file".to_string();
        assert_ne!(plan_hash(&p), base);
    }

    #[test]
    fn test_hash_ignores_confirm_message() {
        let base = plan_hash(&sample_plan());
        let mut p = sample_plan();
        p.steps[0].confirm_message = "really?".to_string();
        assert_eq!(plan_hash(&p), base);
    }

    #[test]
    fn test_hash_ignores_argument_key_order() {
        let base = plan_hash(&sample_plan());
        let mut p = sample_plan();
        p.steps[0].arguments =
            serde_json::from_str(r#"{"content": "hi", "path": "note.txt"}"#).unwrap();
        assert_eq!(plan_hash(&p), base);
    }
}
