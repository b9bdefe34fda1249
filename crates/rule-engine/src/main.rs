//! 资格规则引擎服务
//!
//! 从标准输入逐行读取 JSON 请求，向标准输出逐行写出 JSON 响应。

use anyhow::{Context, Result};
use eligibility_shared::config::AppConfig;
use eligibility_shared::observability;
use rule_engine::{
    ParseLimits, Rule, RuleExecutor, RuleService, RuleStore, from_persisted_json,
};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting rule-engine...");

    let limits = ParseLimits {
        max_tokens: config.engine.max_tokens,
        max_depth: config.engine.max_depth,
    };
    let store = RuleStore::with_limits(limits);
    info!(
        max_tokens = limits.max_tokens,
        max_depth = limits.max_depth,
        "Rule store initialized"
    );

    if let Some(seed_file) = &config.rules.seed_file {
        match load_seed_rules(seed_file, &store).await {
            Ok(count) => info!("Loaded {} rules from {}", count, seed_file),
            Err(e) => warn!("Failed to load seed rules: {:#}, starting with empty store", e),
        }
    }

    let executor = if config.engine.trace_enabled {
        RuleExecutor::new().with_trace()
    } else {
        RuleExecutor::new()
    };
    let service = RuleService::with_executor(store, executor);

    tokio::select! {
        result = serve(&service) => result?,
        _ = shutdown_signal() => {}
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 逐行处理请求，直到输入结束
async fn serve(service: &RuleService) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = Vec::new();

    info!("Waiting for requests on stdin");

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        let Some(response) = service.handle_line(&line) else {
            continue;
        };

        let mut output = serde_json::to_vec(&response)?;
        output.push(b'\n');
        stdout.write_all(&output).await?;
        stdout.flush().await?;
    }

    info!("Input closed");
    Ok(())
}

/// 从 JSON 文件加载预置规则（持久化格式的规则数组）
async fn load_seed_rules(path: &str, store: &RuleStore) -> Result<usize> {
    let content = tokio::fs::read_to_string(Path::new(path))
        .await
        .with_context(|| format!("reading {}", path))?;
    let rules: Vec<Rule> =
        from_persisted_json(&content).with_context(|| format!("parsing {}", path))?;

    Ok(store.load_batch(rules).len())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
