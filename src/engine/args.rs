//! 参数处理器：跨步骤占位符替换
//!
//! 四类占位符按优先级解析：`$step_N[.path]`（点路径抽取，每段允许把 JSON 字符串再解析一层）、
//! `{stepN}` 族、`<stepN>` 族、以及固定模式表识别的自然语言引用（如「이전 단계」「上一步」）。
//! 自然语言引用在没有任何已完成步骤时产出显式 Unresolved，原值原样透传，由调用方提示用户，
//! 不做静默猜测。

use regex::Regex;
use serde_json::{Map, Value};

use crate::engine::plan::StepResults;

/// 提取内容时跳过的噪声键（状态与元信息字段）
const NOISE_KEYS: &[&str] = &[
    "success", "error", "status", "code", "count", "timestamp", "id", "type",
];

/// 优先抽取的内容键，按序尝试
const CONTENT_KEYS: &[&str] = &["content", "message", "text", "description"];

/// 抽取时继续下钻的容器键
const NESTED_KEYS: &[&str] = &["result", "data"];

/// 自然语言步骤引用的固定模式表（韩/英/中，原样保留部署环境遇到的写法）
const MALFORMED_PATTERNS: &[&str] = &[
    // 韩语
    "이전\\s*단계",
    "앞서",
    "결과를\\s*바탕으로",
    "위\\s*단계",
    // 英语
    "(?i)previous\\s+step",
    "(?i)earlier\\s+step",
    "(?i)based\\s+on\\s+the\\s+(?:previous\\s+)?result",
    "(?i)result\\s+(?:from|of)\\s+(?:the\\s+)?step",
    // 中文
    "前一步",
    "上一步",
    "之前的结果",
    "上面的结果",
];

/// 判定参数键是否指向路径类值
const PATH_KEY_HINTS: &[&str] = &["path", "file", "dir", "dest", "target", "output"];

/// 路径类恢复时补齐的默认扩展名
const DEFAULT_EXTENSION: &str = ".txt";

/// process 的输出：替换后的参数表 + 未能解析的自然语言引用所在的键
#[derive(Debug, Default)]
pub struct ProcessedArguments {
    pub arguments: Map<String, Value>,
    pub unresolved: Vec<String>,
}

/// 参数处理器；正则在构造时编译一次
pub struct ArgumentProcessor {
    step_ref: Regex,
    brace_ref: Regex,
    angle_ref: Regex,
    malformed: Vec<Regex>,
}

impl Default for ArgumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgumentProcessor {
    pub fn new() -> Self {
        // 模式表是固定字面量，编译失败属于编程错误，在测试里兜底
        Self {
            step_ref: Regex::new(r"\$step_(\d+)((?:\.[A-Za-z0-9_\-]+)+)?").unwrap(),
            brace_ref: Regex::new(r"\{step_?(\d+)(?:_result)?\}").unwrap(),
            angle_ref: Regex::new(r"<step_?(\d+)(?:_result)?>").unwrap(),
            malformed: MALFORMED_PATTERNS
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect(),
        }
    }

    /// 对每个字符串参数按优先级解析占位符，返回替换后的参数表与未解析键
    pub fn process(
        &self,
        arguments: &Map<String, Value>,
        step_results: &StepResults,
    ) -> ProcessedArguments {
        let mut out = ProcessedArguments::default();
        for (key, value) in arguments {
            let resolved = self.resolve_value(key, value, step_results, &mut out.unresolved);
            out.arguments.insert(key.clone(), resolved);
        }
        out
    }

    fn resolve_value(
        &self,
        key: &str,
        value: &Value,
        step_results: &StepResults,
        unresolved: &mut Vec<String>,
    ) -> Value {
        match value {
            Value::String(s) => {
                Value::String(self.resolve_string(key, s, step_results, unresolved))
            }
            // 嵌套容器逐层下钻，叶子字符串同样可携带占位符
            Value::Object(map) => {
                let mut inner = Map::new();
                for (k, v) in map {
                    inner.insert(k.clone(), self.resolve_value(k, v, step_results, unresolved));
                }
                Value::Object(inner)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_value(key, v, step_results, unresolved))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn resolve_string(
        &self,
        key: &str,
        input: &str,
        step_results: &StepResults,
        unresolved: &mut Vec<String>,
    ) -> String {
        // 1. $step_N 与 $step_N.path.to.field
        let mut current = self
            .step_ref
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let n: u32 = caps[1].parse().unwrap_or(0);
                let raw = match step_results.get(&n) {
                    Some(r) => r,
                    // 未知步骤号：原样保留 token
                    None => return caps[0].to_string(),
                };
                match caps.get(2) {
                    Some(path) => extract_path(raw, path.as_str().trim_start_matches('.'))
                        .unwrap_or_else(|| extract_meaningful(raw)),
                    None => extract_meaningful(raw),
                }
            })
            .into_owned();

        // 2. {stepN} / {step_N} / {stepN_result} / {step_N_result}
        current = self
            .brace_ref
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                let n: u32 = caps[1].parse().unwrap_or(0);
                match step_results.get(&n) {
                    Some(raw) => extract_meaningful(raw),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        // 3. <stepN> 族，对每个已知步骤号做同样替换
        current = self
            .angle_ref
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                let n: u32 = caps[1].parse().unwrap_or(0);
                match step_results.get(&n) {
                    Some(raw) => extract_meaningful(raw),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        // 4. 自然语言引用：整值启发式恢复
        if self.matches_malformed(&current) {
            match self.recover_malformed(key, step_results) {
                PlaceholderOutcome::Substituted(v) => return v,
                PlaceholderOutcome::Unresolved => {
                    unresolved.push(key.to_string());
                    return input.to_string();
                }
            }
        }

        current
    }

    fn matches_malformed(&self, input: &str) -> bool {
        self.malformed.iter().any(|re| re.is_match(input))
    }

    /// 自然语言引用恢复：路径类键且存在步骤 1 则取步骤 1（无扩展名时补默认扩展名），
    /// 否则取编号最大的已完成步骤；一个步骤都没有时为 Unresolved。
    fn recover_malformed(&self, key: &str, step_results: &StepResults) -> PlaceholderOutcome {
        if step_results.is_empty() {
            return PlaceholderOutcome::Unresolved;
        }
        if is_path_key(key) {
            if let Some(raw) = step_results.get(&1) {
                return PlaceholderOutcome::Substituted(ensure_extension(&extract_meaningful(raw)));
            }
        }
        let last = step_results
            .keys()
            .max()
            .and_then(|n| step_results.get(n))
            .map(|raw| extract_meaningful(raw));
        match last {
            Some(v) => PlaceholderOutcome::Substituted(v),
            None => PlaceholderOutcome::Unresolved,
        }
    }

    /// 规划期预修复（§ 执行前）：把自然语言引用规范化为可解析的 `$step_N` 占位符，
    /// 减少首轮可避免的失败。step_number 是该步骤自己的编号。
    pub fn pre_repair(&self, step_number: u32, arguments: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in arguments {
            let repaired = match value {
                Value::String(s) if self.matches_malformed(s) => {
                    if is_path_key(key) {
                        Value::String("$step_1".to_string())
                    } else if step_number > 1 {
                        Value::String(format!("$step_{}", step_number - 1))
                    } else {
                        value.clone()
                    }
                }
                other => other.clone(),
            };
            out.insert(key.clone(), repaired);
        }
        out
    }
}

/// 占位符解析结论：替换成功，或需要调用方向用户呈现歧义
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderOutcome {
    Substituted(String),
    Unresolved,
}

fn is_path_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    PATH_KEY_HINTS.iter().any(|hint| lower.contains(hint))
}

fn ensure_extension(value: &str) -> String {
    let file_part = value.rsplit(['/', '\\']).next().unwrap_or(value);
    if file_part.contains('.') {
        value.to_string()
    } else {
        format!("{}{}", value, DEFAULT_EXTENSION)
    }
}

/// 点路径抽取：逐段下钻，当前节点是字符串时先尝试按 JSON 再解析一层；
/// 路径不可达时返回 None，调用方退回通用抽取。
pub fn extract_path(raw: &str, path: &str) -> Option<String> {
    let mut current: Value = serde_json::from_str(raw).ok()?;
    for segment in path.split('.') {
        if let Value::String(s) = &current {
            if let Ok(reparsed) = serde_json::from_str::<Value>(s) {
                current = reparsed;
            }
        }
        current = match &current {
            Value::Object(map) => map.get(segment)?.clone(),
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?.clone()
            }
            _ => return None,
        };
    }
    Some(scalar_to_string(&current))
}

/// 通用「有意义内容」抽取：JSON 优先取内容键，递归 result/data，
/// 再扫描剩余标量字段（跳过噪声键），最后退回整体 pretty 打印；非 JSON 原样返回
pub fn extract_meaningful(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => extract_from_value(&value),
        Err(_) => raw.trim().to_string(),
    }
}

fn extract_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(_) | Value::Bool(_) => scalar_to_string(value),
        Value::Null => String::new(),
        Value::Array(items) => match items.first() {
            Some(first) => extract_from_value(first),
            None => String::new(),
        },
        Value::Object(map) => {
            for key in CONTENT_KEYS {
                if let Some(Value::String(s)) = map.get(*key) {
                    if !s.trim().is_empty() {
                        return s.trim().to_string();
                    }
                }
            }
            for key in NESTED_KEYS {
                if let Some(nested) = map.get(*key) {
                    let inner = extract_from_value(nested);
                    if !inner.is_empty() {
                        return inner;
                    }
                }
            }
            for (key, v) in map {
                if NOISE_KEYS.contains(&key.as_str()) {
                    continue;
                }
                match v {
                    Value::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
                    Value::Number(_) | Value::Bool(_) => return scalar_to_string(v),
                    _ => {}
                }
            }
            serde_json::to_string_pretty(value).unwrap_or_default()
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 空/无用结果判定：空白、null、空容器，或抽取后得不到任何内容
pub fn is_empty_result(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "{}" || trimmed == "[]" {
        return true;
    }
    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return extract_meaningful(trimmed).trim().is_empty();
    }
    false
}

/// 领域中立的「无可用结果」消息，避免泄漏工具特定措辞
pub fn no_result_message(tool_name: Option<&str>) -> String {
    match tool_name {
        Some(name) => format!("The step using '{}' completed but returned no usable result.", name),
        None => "The step completed but returned no usable result.".to_string(),
    }
}
