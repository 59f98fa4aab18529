//! Prompt 模板
//!
//! 显式模板结构体，构造时注入执行引擎（不设进程级单例）；
//! `{placeholder}` 用字符串替换填充。Default 携带内建模板，
//! from_dir 允许用目录下的同名 txt 文件覆盖（与配置目录里的 prompts/ 约定一致）。

use std::path::Path;

/// 引擎用到的全部模板
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    /// 规划分析：{request} {tools}
    pub analysis: String,
    /// 结果校验：{request} {tool} {result}
    pub validation: String,
    /// 参数修复：{request} {tool} {arguments} {error}
    pub argument_fix: String,
    /// 最终合成：{request} {results}
    pub synthesis: String,
    /// 无工具直接回复的 system prompt
    pub direct: String,
    /// 出错后再规划：{request} {errors}
    pub replan: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            analysis: "You are a planning assistant. Decide whether the user's request needs \
external tools, and if so produce an execution plan.\n\n\
User request: {request}\n\nAvailable tools:\n{tools}\n\n\
Reply with a single JSON object:\n\
{\"need_tools\": true|false, \"plan\": {\"description\": \"...\", \"steps\": [\
{\"step\": 1, \"description\": \"...\", \"tool_name\": \"...\", \"arguments\": {...}, \
\"confirm_message\": \"...\"}]}}\n\
Use \"$step_N\" or \"$step_N.path.to.field\" in arguments to reference an earlier step's result. \
Only use tools from the list above."
                .to_string(),
            validation: "Judge whether this tool result satisfies the user's request.\n\n\
Request: {request}\nTool: {tool}\nResult: {result}\n\n\
Reply with JSON: {\"verdict\": \"ok\"|\"retry\"|\"parse_error\", \"note\": \"...\"}"
                .to_string(),
            argument_fix: "A tool call failed. Suggest corrected arguments.\n\n\
Request: {request}\nTool: {tool}\nArguments: {arguments}\nError: {error}\n\n\
Reply with a JSON object containing only the corrected argument fields."
                .to_string(),
            synthesis: "Write the final answer for the user based on the collected step results.\n\n\
Request: {request}\n\nStep results:\n{results}\n\n\
Answer in the user's language, concisely, without mentioning step numbers."
                .to_string(),
            direct: "You are a helpful assistant. Answer the user directly.".to_string(),
            replan: "The previous attempt hit execution errors. Produce a different plan that \
avoids them.\n\nOriginal request: {request}\nErrors:\n{errors}"
                .to_string(),
        }
    }
}

impl PromptTemplates {
    /// 从目录加载覆盖：analysis.txt / validation.txt / argument_fix.txt /
    /// synthesis.txt / direct.txt / replan.txt，缺失的用内建模板
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut t = Self::default();
        let mut load = |name: &str, slot: &mut String| {
            if let Ok(text) = std::fs::read_to_string(dir.join(name)) {
                if !text.trim().is_empty() {
                    *slot = text;
                }
            }
        };
        load("analysis.txt", &mut t.analysis);
        load("validation.txt", &mut t.validation);
        load("argument_fix.txt", &mut t.argument_fix);
        load("synthesis.txt", &mut t.synthesis);
        load("direct.txt", &mut t.direct);
        load("replan.txt", &mut t.replan);
        t
    }

    /// `{key}` 逐对替换
    pub fn render(template: &str, pairs: &[(&str, &str)]) -> String {
        let mut out = template.to_string();
        for (key, value) in pairs {
            out = out.replace(&format!("{{{}}}", key), value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_placeholders() {
        let out = PromptTemplates::render("a {x} b {y}", &[("x", "1"), ("y", "2")]);
        assert_eq!(out, "a 1 b 2");
    }

    #[test]
    fn test_from_dir_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("direct.txt"), "custom prompt").unwrap();
        let t = PromptTemplates::from_dir(dir.path());
        assert_eq!(t.direct, "custom prompt");
        assert!(t.analysis.contains("need_tools"));
    }
}
