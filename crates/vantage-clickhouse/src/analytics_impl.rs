use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{info, warn};

use vantage_core::analytics::{
    AnalyticsEngine, AnalyticsRequest, Breakdown, BreakdownEntry, ChartOptions, ChartResult,
    ErrorListOptions, ErrorListing, ErrorStatus, EventMetaRow, MetricKind, RenderMode,
};
use vantage_core::axis::ChartAxis;
use vantage_core::comparison::{
    compare_against_zero, compare_periods, order_summary_rows, period_metrics, PeriodComparison,
    SummaryRow,
};
use vantage_core::error::{EngineError, EngineResult, ValidationError};
use vantage_core::flow::{build_user_flow, FlowEdge, UserFlow};
use vantage_core::funnel::{funnel_from_levels, validate_funnel_steps, FunnelLevelCount, FunnelStep};
use vantage_core::session;
use vantage_core::store::fetch_rows;

use crate::backend::is_all_time;
use crate::queries::breakdown::per_dimension_breakdown;
use crate::queries::chart::{build_chart_query, chart_series};
use crate::queries::errors::{
    error_exists_query, insert_status_query, is_valid_eid, list_errors_query, CountRow,
};
use crate::queries::filters::{compile_filters, CompiledFilter};
use crate::queries::flow::transitions_query;
use crate::queries::funnel::funnel_query;
use crate::queries::meta::event_meta_query;
use crate::queries::source_table;
use crate::queries::summary::summary_query;
use crate::ClickHouseBackend;

impl ClickHouseBackend {
    async fn summary_for(
        &self,
        pid: &str,
        request: &AnalyticsRequest,
        filter: &CompiledFilter,
    ) -> EngineResult<PeriodComparison> {
        let project = self.project(pid).await?;
        let scoped = AnalyticsRequest {
            pid: pid.to_string(),
            ..request.clone()
        };
        let table = source_table(MetricKind::Traffic, filter);
        let range = self.resolve_range(&scoped, &project, table).await?;
        let all_time = is_all_time(&scoped);

        let query = summary_query(pid, &range, filter, !all_time);
        let rows: Vec<SummaryRow> = fetch_rows(self.store.as_ref(), &query).await?;
        let (current, previous) = order_summary_rows(rows);
        let custom = filter.custom_event_filter_applied;
        let current = period_metrics(current.as_ref(), custom);

        Ok(if all_time {
            compare_against_zero(current)
        } else {
            compare_periods(current, period_metrics(previous.as_ref(), custom))
        })
    }
}

#[async_trait]
impl AnalyticsEngine for ClickHouseBackend {
    async fn build_chart(
        &self,
        request: &AnalyticsRequest,
        kind: MetricKind,
        options: ChartOptions,
    ) -> EngineResult<ChartResult> {
        let project = self.project(&request.pid).await?;
        let filter = compile_filters(request.filters.as_deref(), kind, false)?;
        let range = self
            .resolve_range(request, &project, source_table(kind, &filter))
            .await?;

        let query = build_chart_query(&request.pid, kind, &range, &filter, options);
        let axis = ChartAxis::for_range(&range);
        let series = chart_series(self.store.as_ref(), &query, kind, options, &axis).await?;
        info!(
            pid = %request.pid,
            kind = kind.as_str(),
            bucket = range.time_bucket.as_str(),
            points = axis.len(),
            "Chart built"
        );

        let mode = if kind == MetricKind::Performance {
            RenderMode::Periodical
        } else {
            options.mode
        };
        Ok(ChartResult {
            kind,
            time_bucket: range.time_bucket,
            mode,
            x: axis.shifted,
            x_utc: axis.utc,
            series,
            applied_filters: filter.normalized_clauses,
            custom_event_filter_applied: filter.custom_event_filter_applied,
        })
    }

    async fn compute_funnel(
        &self,
        request: &AnalyticsRequest,
        steps: &[String],
    ) -> EngineResult<Vec<FunnelStep>> {
        validate_funnel_steps(steps)?;
        let project = self.project(&request.pid).await?;
        let range = self.resolve_range(request, &project, "analytics").await?;

        let query = funnel_query(&request.pid, steps, &range, self.config.funnel_window_secs);
        let levels: Vec<FunnelLevelCount> = fetch_rows(self.store.as_ref(), &query).await?;
        info!(pid = %request.pid, steps = steps.len(), rows = levels.len(), "Funnel computed");
        Ok(funnel_from_levels(&levels, steps))
    }

    async fn compute_saved_funnel(
        &self,
        request: &AnalyticsRequest,
        funnel_id: &str,
    ) -> EngineResult<Vec<FunnelStep>> {
        let funnel = self
            .metadata
            .get_funnel(&request.pid, funnel_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Funnel"))?;
        self.compute_funnel(request, &funnel.steps).await
    }

    async fn compute_user_flow(&self, request: &AnalyticsRequest) -> EngineResult<UserFlow> {
        let project = self.project(&request.pid).await?;
        let filter = compile_filters(request.filters.as_deref(), MetricKind::Traffic, true)?;
        let range = self.resolve_range(request, &project, "analytics").await?;

        let query = transitions_query(&request.pid, &range, &filter);
        let edges: Vec<FlowEdge> = fetch_rows(self.store.as_ref(), &query).await?;
        info!(pid = %request.pid, rows = edges.len(), "User flow computed");
        Ok(build_user_flow(edges))
    }

    async fn compute_summary(
        &self,
        pids: &[String],
        request: &AnalyticsRequest,
    ) -> EngineResult<BTreeMap<String, PeriodComparison>> {
        let filter = compile_filters(request.filters.as_deref(), MetricKind::Traffic, false)?;
        let summaries = try_join_all(pids.iter().map(|pid| {
            let filter = &filter;
            async move {
                let summary = self.summary_for(pid, request, filter).await?;
                Ok::<_, EngineError>((pid.clone(), summary))
            }
        }))
        .await?;
        Ok(summaries.into_iter().collect())
    }

    async fn compute_breakdown(
        &self,
        request: &AnalyticsRequest,
        kind: MetricKind,
        columns: Option<&[String]>,
    ) -> EngineResult<Breakdown> {
        let columns: Vec<&str> = match columns {
            Some(requested) => {
                for column in requested {
                    if !kind.allows_column(column) {
                        return Err(ValidationError::UnsupportedFilter(column.clone()).into());
                    }
                }
                requested.iter().map(String::as_str).collect()
            }
            None => kind.filter_columns().to_vec(),
        };

        let project = self.project(&request.pid).await?;
        let filter = compile_filters(request.filters.as_deref(), kind, false)?;
        let range = self
            .resolve_range(request, &project, source_table(kind, &filter))
            .await?;

        let store = self.store.as_ref();
        let entries = try_join_all(columns.iter().map(|column| {
            let query = per_dimension_breakdown(
                &request.pid,
                column,
                kind,
                &range,
                &filter,
                filter.page_inclusive,
            );
            async move {
                let rows: Vec<BreakdownEntry> = fetch_rows(store, &query).await?;
                Ok::<_, anyhow::Error>((column.to_string(), rows))
            }
        }))
        .await?;
        info!(
            pid = %request.pid,
            kind = kind.as_str(),
            columns = entries.len(),
            "Breakdown computed"
        );
        Ok(entries.into_iter().collect())
    }

    async fn list_errors(
        &self,
        request: &AnalyticsRequest,
        options: ErrorListOptions,
    ) -> EngineResult<Vec<ErrorListing>> {
        let project = self.project(&request.pid).await?;
        let filter = compile_filters(request.filters.as_deref(), MetricKind::Errors, false)?;
        let range = self.resolve_range(request, &project, "errors").await?;

        let query = list_errors_query(&request.pid, &range, &filter, options);
        Ok(fetch_rows(self.store.as_ref(), &query).await?)
    }

    async fn update_error_status(
        &self,
        pid: &str,
        eid: &str,
        status: ErrorStatus,
    ) -> EngineResult<()> {
        if !is_valid_eid(eid) {
            return Err(ValidationError::InvalidErrorId(eid.to_string()).into());
        }
        self.project(pid).await?;

        let rows: Vec<CountRow> =
            fetch_rows(self.store.as_ref(), &error_exists_query(pid, eid)).await?;
        if rows.first().map_or(0, |row| row.c) == 0 {
            return Err(EngineError::not_found("Error"));
        }

        self.store.execute(&insert_status_query(pid, eid, status)).await?;
        info!(pid, eid, status = status.as_str(), "Error status updated");
        Ok(())
    }

    async fn custom_event_metadata(
        &self,
        request: &AnalyticsRequest,
        event: &str,
    ) -> EngineResult<Vec<EventMetaRow>> {
        let project = self.project(&request.pid).await?;
        let filter = compile_filters(request.filters.as_deref(), MetricKind::CustomEvents, false)?;
        let range = self.resolve_range(request, &project, "customEV").await?;

        let query = event_meta_query(&request.pid, event, &range, &filter);
        match fetch_rows(self.store.as_ref(), &query).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                warn!(pid = %request.pid, event, error = ?err, "Custom event metadata unavailable");
                Ok(Vec::new())
            }
        }
    }

    async fn live_visitors(&self, pid: &str) -> EngineResult<u64> {
        self.project(pid).await?;
        Ok(session::live_visitors(self.cache.as_ref(), pid).await?)
    }
}
