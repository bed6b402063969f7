use std::collections::HashMap;
use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::protocol::API_PREFIX;
use shared::types::ServiceInfo;
use crate::reactor::HostReactor;

#[derive(Clone)]
pub struct AppState {
    pub reactor: Arc<HostReactor>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStatus {
    pub push_port: u16,
    pub cached_services: usize,
}

#[derive(Deserialize)]
pub struct ServiceQuery {
    #[serde(default)]
    pub clusters: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQuery {
    pub names: String,
    /// JSON object mapping service name to clusters
    #[serde(default)]
    pub clusters: Option<String>,
    #[serde(default)]
    pub find_back: bool,
}

#[derive(Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub clusters: String,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/push", get(get_push_status))
        .route("/services", get(get_services))
        .route("/services/:name", get(get_service))
        .route("/catalog", get(get_catalog));

    Router::new().nest(API_PREFIX, api).with_state(state)
}

async fn get_push_status(State(state): State<AppState>) -> Json<PushStatus> {
    Json(PushStatus {
        push_port: state.reactor.push_port(),
        cached_services: state.reactor.store().len(),
    })
}

async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ServiceQuery>,
) -> Json<ServiceInfo> {
    let service = state.reactor.get_service_info(&name, &params.clusters).await;
    Json(service.as_ref().clone())
}

async fn get_services(
    State(state): State<AppState>,
    Query(params): Query<BatchQuery>,
) -> Json<Vec<ServiceInfo>> {
    let names: Vec<String> = params
        .names
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let clusters: HashMap<String, String> = params
        .clusters
        .as_deref()
        .and_then(|raw| match serde_json::from_str(raw) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!("Ignoring malformed clusters map: {}", e);
                None
            }
        })
        .unwrap_or_default();

    Json(state.reactor.get_service_infos(&names, &clusters, params.find_back).await)
}

async fn get_catalog(
    State(state): State<AppState>,
    Query(params): Query<CatalogQuery>,
) -> Json<Vec<ServiceInfo>> {
    Json(
        state
            .reactor
            .get_all_service_info(&params.namespace, &params.group, &params.clusters)
            .await,
    )
}
