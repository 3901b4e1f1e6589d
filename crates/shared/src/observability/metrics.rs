//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use super::ObservabilityConfig;

/// 初始化 Prometheus 指标导出
///
/// 安装全局 recorder，并在指定端口暴露 `/metrics` 端点。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_common_metrics(&config.service_name);
    info!("Metrics exporter listening on {}", addr);

    Ok(())
}

/// 注册通用指标（预定义的业务指标）
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "coupon_assignments_total",
        "Total number of coupon assignment attempts"
    );

    metrics::describe_counter!("redemptions_total", "Total number of redemption attempts");
    metrics::describe_histogram!(
        "redemption_duration_seconds",
        "Redemption duration in seconds"
    );

    metrics::describe_counter!(
        "automation_steps_total",
        "Total number of executed automation steps"
    );
    metrics::describe_counter!(
        "scheduled_steps_claimed_total",
        "Total number of delayed automation steps claimed by workers"
    );
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last worker loop iteration"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录优惠券分配
#[inline]
pub fn record_assignment(status: &str) {
    metrics::counter!(
        "coupon_assignments_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录兑换
#[inline]
pub fn record_redemption(status: &str, duration_secs: f64) {
    metrics::counter!(
        "redemptions_total",
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "redemption_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration_secs);
}

/// 记录自动化步骤执行结果
#[inline]
pub fn record_automation_step(action: &str, outcome: &str) {
    metrics::counter!(
        "automation_steps_total",
        "action" => action.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录 Worker 认领的延迟步骤数量
#[inline]
pub fn record_scheduled_steps(claimed: usize) {
    metrics::counter!("scheduled_steps_claimed_total").increment(claimed as u64);
}

/// 记录 Worker 最近一次运行时间，供告警判断 Worker 是否存活
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!(
        "worker_last_run_timestamp",
        "worker" => worker.to_string()
    )
    .set(chrono::Utc::now().timestamp() as f64);
}
