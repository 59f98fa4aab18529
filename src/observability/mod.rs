//! 可观测性

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化日志：默认 info，verbose 时 debug，可被 RUST_LOG 覆盖
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()))
        .with(fmt::layer())
        .init();
}
