use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use vantage_clickhouse::queries::chart::build_chart_query;
use vantage_clickhouse::queries::filters::compile_filters;
use vantage_clickhouse::ClickHouseBackend;
use vantage_core::analytics::{AnalyticsEngine, AnalyticsRequest, ChartOptions, MetricKind};
use vantage_core::cache::MemoryCache;
use vantage_core::config::EngineConfig;
use vantage_core::error::{EngineError, EngineResult};
use vantage_core::timeframe::{resolve_time_range, TimeframeQuery};
use vantage_metadata::{MemoryMetadataStore, Project};

const USAGE: &str = "usage: vantage <explain|chart|summary|funnel|flow> <request.json>";

/// A request file: the dashboard request plus whatever the subcommand needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile {
    #[serde(flatten)]
    request: AnalyticsRequest,
    #[serde(default)]
    kind: MetricKind,
    #[serde(default)]
    options: ChartOptions,
    #[serde(default)]
    steps: Vec<String>,
    /// Projects to summarise; defaults to `pid`.
    #[serde(default)]
    pids: Vec<String>,
}

#[derive(Serialize)]
struct Explained<'a> {
    range: vantage_core::timeframe::TimeRange,
    filter: &'a vantage_clickhouse::queries::filters::CompiledFilter,
    sql: &'a str,
    params: &'a vantage_core::store::QueryParams,
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    code: &'static str,
    message: String,
}

fn read_request(path: &str) -> Result<RequestFile> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("{path} is not a valid request"))
}

/// Resolve, compile and build the chart query without touching a store.
fn explain(file: &RequestFile, config: &EngineConfig) -> EngineResult<serde_json::Value> {
    let request = &file.request;
    let query = TimeframeQuery {
        from: request.from.as_deref(),
        to: request.to.as_deref(),
        period: request.period.as_deref(),
        timezone: Some(
            request
                .timezone
                .as_deref()
                .unwrap_or(&config.default_timezone),
        ),
        time_bucket: request.time_bucket,
        all_time_diff: None,
    };
    let range = resolve_time_range(&query, Utc::now())?;
    let filter = compile_filters(request.filters.as_deref(), file.kind, false)?;
    let built = build_chart_query(&request.pid, file.kind, &range, &filter, file.options);
    let explained = Explained {
        range,
        filter: &filter,
        sql: &built.sql,
        params: &built.params,
    };
    serde_json::to_value(&explained).map_err(|e| EngineError::Upstream(e.into()))
}

async fn run(
    command: &str,
    file: RequestFile,
    config: EngineConfig,
) -> EngineResult<serde_json::Value> {
    let metadata = MemoryMetadataStore::new();
    let mut pids = file.pids.clone();
    if pids.is_empty() {
        pids.push(file.request.pid.clone());
    }
    for pid in pids.iter().chain(std::iter::once(&file.request.pid)) {
        metadata
            .insert_project(Project {
                id: pid.clone(),
                name: pid.clone(),
                timezone: None,
                origins: Vec::new(),
                ip_blacklist: Vec::new(),
                bot_protection_level: String::new(),
                password_protected: false,
            })
            .await;
    }
    let backend =
        ClickHouseBackend::connect(config, Arc::new(MemoryCache::new()), Arc::new(metadata));

    let to_json = |value: Result<serde_json::Value, serde_json::Error>| {
        value.map_err(|e| EngineError::Upstream(e.into()))
    };
    let request = &file.request;
    match command {
        "chart" => {
            let chart = backend.build_chart(request, file.kind, file.options).await?;
            to_json(serde_json::to_value(chart))
        }
        "summary" => {
            let summary = backend.compute_summary(&pids, request).await?;
            to_json(serde_json::to_value(summary))
        }
        "funnel" => {
            let funnel = backend.compute_funnel(request, &file.steps).await?;
            to_json(serde_json::to_value(funnel))
        }
        _ => {
            let flow = backend.compute_user_flow(request).await?;
            to_json(serde_json::to_value(flow))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vantage=info".parse()?),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (Some(command), Some(path)) = (args.get(1), args.get(2)) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    if !matches!(command.as_str(), "explain" | "chart" | "summary" | "funnel" | "flow") {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let config = EngineConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let file = read_request(path)?;
    info!(
        command = %command,
        pid = %file.request.pid,
        kind = file.kind.as_str(),
        "Running request"
    );

    let outcome = if command == "explain" {
        explain(&file, &config)
    } else {
        run(command, file, config).await
    };

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            let (status, code, message) = err.to_response_parts();
            let body = ErrorBody {
                status,
                code,
                message,
            };
            eprintln!("{}", serde_json::to_string(&body)?);
            std::process::exit(1);
        }
    }
}
