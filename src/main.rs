//! Weaver - 终端智能体
//!
//! 入口：解析 CLI 参数、初始化日志、装配执行管线并处理一次查询。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use weaver::config::{load_config, AppConfig};
use weaver::engine::{
    default_history_path, ArgumentFixer, AutoGate, ConfirmGate, ExecutionManager,
    LlmArgumentFixer, LlmResultValidator, PlanEvaluator, PlanHistoryManager, PlanningService,
    PromptTemplates, QueryProcessor, ResponseGenerator, ResultValidator, StepExecutor,
    StopReason, TerminalGate,
};
use weaver::llm::{LlmClient, MockLlmClient, OpenAiClient};
use weaver::memory::ConversationMemory;
use weaver::tools::{EchoTool, RegistryInvoker, ToolInvoker, ToolRegistry};

/// 终端智能体：把一次请求编排为有界、可重试的工具调用序列
#[derive(Debug, Parser)]
#[command(name = "weaver", version, about)]
struct Cli {
    /// 用户请求
    query: Option<String>,

    /// 全自动模式：跳过逐步确认
    #[arg(long)]
    full_auto: bool,

    /// 输出调试日志
    #[arg(long, visible_alias = "verbose")]
    debug: bool,

    /// 列出工具目录后退出
    #[arg(long)]
    tools: bool,

    /// 打印诊断信息后退出
    #[arg(long)]
    diagnose: bool,

    /// 额外配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,
}

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) => {
            tracing::info!(model = %cfg.llm.model, "using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        Err(_) => {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

fn build_invoker(cfg: &AppConfig) -> Arc<RegistryInvoker> {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    Arc::new(RegistryInvoker::new(registry, cfg.engine.tool_timeout_secs))
}

fn history_path(cfg: &AppConfig) -> PathBuf {
    cfg.history.path.clone().unwrap_or_else(default_history_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    weaver::observability::init(cli.debug);

    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let invoker = build_invoker(&cfg);

    if cli.tools {
        let catalog = invoker.catalog().await.context("Catalog fetch failed")?;
        println!("Available tools:");
        for spec in catalog {
            println!("  {} - {} (params: {})", spec.name, spec.description, spec.parameter_names.join(", "));
        }
        return Ok(());
    }

    if cli.diagnose {
        let history = PlanHistoryManager::open(history_path(&cfg))
            .context("Plan history open failed")?;
        let catalog = invoker.catalog().await.context("Catalog fetch failed")?;
        println!("model: {}", cfg.llm.model);
        println!("base_url: {}", cfg.llm.base_url.as_deref().unwrap_or("(default)"));
        println!("api_key: {}", if std::env::var("OPENAI_API_KEY").is_ok() { "set" } else { "missing (Mock LLM)" });
        println!("plan history: {} ({} entries)", history.path().display(), history.len());
        println!("tools: {}", catalog.len());
        return Ok(());
    }

    let Some(query) = cli.query else {
        anyhow::bail!("No query given. Try: weaver \"your request\"");
    };

    // Ctrl-C -> 协作取消
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let llm = create_llm_from_config(&cfg);
    let templates = match &cfg.app.prompts_dir {
        Some(dir) => PromptTemplates::from_dir(dir),
        None => PromptTemplates::default(),
    };

    let gate: Arc<dyn ConfirmGate> = if cli.full_auto {
        Arc::new(AutoGate)
    } else {
        Arc::new(TerminalGate)
    };
    let validator: Option<Arc<dyn ResultValidator>> = if cfg.llm.validate_results {
        Some(Arc::new(LlmResultValidator::new(llm.clone(), &templates)))
    } else {
        None
    };
    let fixer: Option<Arc<dyn ArgumentFixer>> = if cfg.llm.fix_arguments {
        Some(Arc::new(LlmArgumentFixer::new(llm.clone(), &templates)))
    } else {
        None
    };

    let executor = StepExecutor::new(
        invoker.clone(),
        gate,
        validator,
        fixer,
        cfg.engine.max_step_retries,
        cancel.clone(),
    );
    let planning = PlanningService::new(llm.clone(), invoker.clone(), None, &templates);
    let manager = ExecutionManager::new(
        executor,
        ResponseGenerator::new(llm.clone(), &templates),
    );
    let history = PlanHistoryManager::open(history_path(&cfg))
        .context("Plan history open failed")?;
    let mut processor = QueryProcessor::new(
        planning,
        manager,
        PlanEvaluator::new(history),
        ResponseGenerator::new(llm.clone(), &templates),
        ConversationMemory::new(cfg.app.max_context_turns),
        &templates,
        cfg.engine.max_iterations,
        cancel,
    );

    let report = processor
        .process_query(&query)
        .await
        .context("Query processing failed")?;

    let (prompt_tokens, completion_tokens, total_tokens) = llm.token_usage();
    tracing::debug!(prompt_tokens, completion_tokens, total_tokens, "cumulative token usage");

    match report.stop_reason {
        StopReason::DuplicatePlan => {
            tracing::warn!("stopped: follow-up plan duplicated an already-tried plan");
        }
        StopReason::IterationBudget => {
            tracing::warn!(iterations = report.iterations, "stopped: iteration budget reached");
        }
        _ => {}
    }
    println!("{}", report.response);

    Ok(())
}
