//! 专用工作流模式识别
//!
//! 两类请求不走通用规划，直接交给外部工作流：
//! - 代码修改：修改类动词 + 文件扩展名或路径状子串
//! - 调研检索:检索类动词 + 成文输出动词或时效词
//! 关键词/正则启发式，表是固定的，识别与委派解耦（WorkflowRouter 能力注入）。

use async_trait::async_trait;
use regex::Regex;

/// 识别出的工作流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    CodeModification,
    Research,
}

impl WorkflowKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowKind::CodeModification => "code_modification",
            WorkflowKind::Research => "research",
        }
    }
}

/// 外部工作流执行能力；返回可直接展示给用户的结果文本
#[async_trait]
pub trait WorkflowRouter: Send + Sync {
    async fn run(&self, kind: WorkflowKind, request: &str) -> Result<String, String>;
}

/// 修改类动词（韩/英/中）
const MODIFY_VERBS: &[&str] = &[
    "수정", "고쳐", "바꿔", "변경", "modify", "fix", "change", "update", "edit", "refactor",
    "修改", "修复", "改掉",
];

/// 检索类动词
const SEARCH_VERBS: &[&str] = &[
    "검색", "찾아", "조사", "search", "find", "research", "look up", "搜索", "调研", "查找",
];

/// 成文输出动词
const REPORT_VERBS: &[&str] = &[
    "정리", "요약", "보고서", "summarize", "report", "write up", "compile", "整理", "总结",
    "报告",
];

/// 时效词
const RECENCY_WORDS: &[&str] = &[
    "최신", "최근", "오늘", "latest", "recent", "today", "news", "最新", "最近", "今天",
];

/// 模式识别器；文件形状正则构造时编译
pub struct WorkflowPatterns {
    file_shape: Regex,
}

impl Default for WorkflowPatterns {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowPatterns {
    pub fn new() -> Self {
        Self {
            // 扩展名（main.rs、config.toml）或路径状子串（src/lib.rs、./notes）
            file_shape: Regex::new(r"(\S+\.[A-Za-z0-9]{1,5}\b|\S*/\S+)").unwrap(),
        }
    }

    /// 检测请求是否命中某个专用工作流
    pub fn detect(&self, request: &str) -> Option<WorkflowKind> {
        let lower = request.to_lowercase();
        if contains_any(&lower, MODIFY_VERBS) && self.file_shape.is_match(request) {
            return Some(WorkflowKind::CodeModification);
        }
        if contains_any(&lower, SEARCH_VERBS)
            && (contains_any(&lower, REPORT_VERBS) || contains_any(&lower, RECENCY_WORDS))
        {
            return Some(WorkflowKind::Research);
        }
        None
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_modification_detected() {
        let p = WorkflowPatterns::new();
        assert_eq!(
            p.detect("fix the bug in src/main.rs"),
            Some(WorkflowKind::CodeModification)
        );
        assert_eq!(
            p.detect("config.toml 파일 수정해줘"),
            Some(WorkflowKind::CodeModification)
        );
    }

    #[test]
    fn test_modify_verb_without_file_is_not_code_modification() {
        let p = WorkflowPatterns::new();
        assert_ne!(
            p.detect("fix my sleep schedule"),
            Some(WorkflowKind::CodeModification)
        );
    }

    #[test]
    fn test_research_detected() {
        let p = WorkflowPatterns::new();
        assert_eq!(
            p.detect("search the latest rust release notes"),
            Some(WorkflowKind::Research)
        );
        assert_eq!(
            p.detect("최신 뉴스 검색해서 정리해줘"),
            Some(WorkflowKind::Research)
        );
        assert_eq!(p.detect("搜索相关论文并总结"), Some(WorkflowKind::Research));
    }

    #[test]
    fn test_plain_search_without_report_or_recency() {
        let p = WorkflowPatterns::new();
        assert_eq!(p.detect("search my contact list"), None);
    }

    #[test]
    fn test_ordinary_request_not_detected() {
        let p = WorkflowPatterns::new();
        assert_eq!(p.detect("what's the weather like"), None);
    }
}
