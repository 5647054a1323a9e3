//! 日志系统配置模块
//!
//! 钱包引擎自身的日志按配置级别输出，依赖库（如 ethers）默认只保留 warn

use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;

const CRATE_TARGET: &str = "avacore";

/// 由配置级别生成过滤指令，如 `warn,avacore=debug`
pub fn filter_directive(level: &str) -> String {
    format!("warn,{}={}", CRATE_TARGET, level.to_lowercase())
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先于配置；重复初始化返回错误，由调用方决定是否忽略
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(&config.level)))?;

    if config.format == "json" {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init()?;
    } else {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init()?;
    }

    tracing::debug!(level = %config.level, format = %config.format, "logging initialized");
    Ok(())
}

/// 使用环境变量中的默认配置初始化；已初始化时静默跳过
pub fn init_default_logging() {
    let config = LoggingConfig::default();
    if let Err(e) = init_logging(&config) {
        eprintln!("logging not initialized: {}", e);
    }
}
