// src/server/routes.rs

use super::dashboard;
use super::AppState;
use crate::analysis::{AnalyticsReport, TrafficState};
use crate::pipeline::metrics::MetricsSummary;
use axum::extract::State;
use axum::response::{Html, Json};

pub async fn index(State(app): State<AppState>) -> Html<String> {
    Html(dashboard::render(&app.shared.traffic_snapshot()))
}

pub async fn traffic_data(State(app): State<AppState>) -> Json<TrafficState> {
    Json(app.shared.traffic_snapshot())
}

pub async fn analytics_data(State(app): State<AppState>) -> Json<AnalyticsReport> {
    Json(app.shared.analytics_report(chrono::Utc::now().timestamp()))
}

pub async fn metrics(State(app): State<AppState>) -> Json<MetricsSummary> {
    Json(app.metrics.summary())
}
