//! 计划精炼器：执行前折叠计划内的重复步骤
//!
//! 同一计划里 (tool_name, 规范化参数) 相同的步骤只保留首个；幸存步骤重新连续编号，
//! 且后续步骤参数里的所有占位符族（$step_N、{stepN}、<stepN>）改写到幸存编号，
//! 折叠不会破坏跨步骤引用。

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::engine::plan::{ExecutionPlan, ExecutionStep};

pub struct PlanRefiner {
    step_ref: Regex,
    brace_ref: Regex,
    angle_ref: Regex,
}

impl Default for PlanRefiner {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanRefiner {
    pub fn new() -> Self {
        Self {
            step_ref: Regex::new(r"\$step_(\d+)").unwrap(),
            brace_ref: Regex::new(r"\{(step_?)(\d+)((?:_result)?)\}").unwrap(),
            angle_ref: Regex::new(r"<(step_?)(\d+)((?:_result)?)>").unwrap(),
        }
    }

    /// 折叠重复步骤并重编号；无重复时原样返回（编号仍会归一为 1..n）
    pub fn refine(&self, plan: &ExecutionPlan) -> ExecutionPlan {
        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut survivors: Vec<ExecutionStep> = Vec::new();
        // 旧编号 -> 新编号；重复步骤映射到被保留步骤的新编号
        let mut renumber: HashMap<u32, u32> = HashMap::new();

        for step in &plan.steps {
            let key = format!(
                "{}\u{1}{}",
                step.tool_name,
                Value::Object(step.arguments.clone())
            );
            match seen.get(&key) {
                Some(kept_new) => {
                    tracing::debug!(step = step.step, tool = %step.tool_name, "collapsed duplicate step");
                    renumber.insert(step.step, *kept_new);
                }
                None => {
                    let new_number = survivors.len() as u32 + 1;
                    seen.insert(key, new_number);
                    renumber.insert(step.step, new_number);
                    let mut kept = step.clone();
                    kept.step = new_number;
                    survivors.push(kept);
                }
            }
        }

        for step in &mut survivors {
            step.arguments = self.rewrite_arguments(&step.arguments, &renumber);
        }

        ExecutionPlan {
            description: plan.description.clone(),
            steps: survivors,
        }
    }

    fn rewrite_arguments(
        &self,
        arguments: &serde_json::Map<String, Value>,
        renumber: &HashMap<u32, u32>,
    ) -> serde_json::Map<String, Value> {
        let mut out = serde_json::Map::new();
        for (k, v) in arguments {
            out.insert(k.clone(), self.rewrite_value(v, renumber));
        }
        out
    }

    fn rewrite_value(&self, value: &Value, renumber: &HashMap<u32, u32>) -> Value {
        match value {
            Value::String(s) => Value::String(self.rewrite_string(s, renumber)),
            Value::Object(map) => Value::Object(self.rewrite_arguments(map, renumber)),
            Value::Array(items) => Value::Array(
                items.iter().map(|v| self.rewrite_value(v, renumber)).collect(),
            ),
            other => other.clone(),
        }
    }

    fn rewrite_string(&self, input: &str, renumber: &HashMap<u32, u32>) -> String {
        let mapped = |n: u32| renumber.get(&n).copied().unwrap_or(n);
        let s = self
            .step_ref
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let n: u32 = caps[1].parse().unwrap_or(0);
                format!("$step_{}", mapped(n))
            })
            .into_owned();
        let s = self
            .brace_ref
            .replace_all(&s, |caps: &regex::Captures<'_>| {
                let n: u32 = caps[2].parse().unwrap_or(0);
                format!("{{{}{}{}}}", &caps[1], mapped(n), &caps[3])
            })
            .into_owned();
        self.angle_ref
            .replace_all(&s, |caps: &regex::Captures<'_>| {
                let n: u32 = caps[2].parse().unwrap_or(0);
                format!("<{}{}{}>", &caps[1], mapped(n), &caps[3])
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, tool: &str, args: &str) -> ExecutionStep {
        ExecutionStep {
            step: n,
            description: format!("step {}", n),
            tool_name: tool.to_string(),
            arguments: serde_json::from_str(args).unwrap(),
            confirm_message: String::new(),
        }
    }

    #[test]
    fn test_collapse_identical_steps() {
        let refiner = PlanRefiner::new();
        let plan = ExecutionPlan {
            description: "d".to_string(),
            steps: vec![
                step(1, "search", r#"{"query": "rust"}"#),
                step(2, "search", r#"{"query": "rust"}"#),
                step(3, "save", r#"{"content": "$step_2"}"#),
            ],
        };
        let refined = refiner.refine(&plan);
        assert_eq!(refined.steps.len(), 2);
        assert_eq!(refined.steps[1].step, 2);
        // 被折叠的 step 2 的引用改写到幸存的 step 1
        assert_eq!(refined.steps[1].arguments["content"], Value::from("$step_1"));
    }

    #[test]
    fn test_different_arguments_not_collapsed() {
        let refiner = PlanRefiner::new();
        let plan = ExecutionPlan {
            description: "d".to_string(),
            steps: vec![
                step(1, "search", r#"{"query": "rust"}"#),
                step(2, "search", r#"{"query": "tokio"}"#),
            ],
        };
        assert_eq!(refiner.refine(&plan).steps.len(), 2);
    }

    #[test]
    fn test_renumbering_after_collapse() {
        let refiner = PlanRefiner::new();
        let plan = ExecutionPlan {
            description: "d".to_string(),
            steps: vec![
                step(1, "fetch", r#"{"url": "a"}"#),
                step(2, "fetch", r#"{"url": "a"}"#),
                step(3, "summarize", r#"{"text": "{step3_result}", "prev": "<step_2>"}"#),
            ],
        };
        let refined = refiner.refine(&plan);
        assert_eq!(refined.steps.len(), 2);
        let last = &refined.steps[1];
        assert_eq!(last.step, 2);
        // step3 自身改写为新编号 2，step2 的引用指到幸存的 1
        assert_eq!(last.arguments["text"], Value::from("{step2_result}"));
        assert_eq!(last.arguments["prev"], Value::from("<step_1>"));
    }

    #[test]
    fn test_refine_without_duplicates_normalizes_numbers() {
        let refiner = PlanRefiner::new();
        let plan = ExecutionPlan {
            description: "d".to_string(),
            steps: vec![step(2, "a", "{}"), step(5, "b", r#"{"x": "$step_2"}"#)],
        };
        let refined = refiner.refine(&plan);
        assert_eq!(refined.steps[0].step, 1);
        assert_eq!(refined.steps[1].step, 2);
        assert_eq!(refined.steps[1].arguments["x"], Value::from("$step_1"));
    }
}
