//! Numalens datasource façade.
//!
//! Frontends (CLI, plugin hosts) depend on [`LensApi`]. [`Datasource`] is the
//! in-process implementation: it owns the datasource settings and the two
//! capability handles, and wires parsing, shaping and enrichment together.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use numalens_core::{LensError, LensResult, ResourceKind};
pub use numalens_kubehub::{ControlPlane, DetachedControlPlane, RequestCtx, ResourceStore};
pub use numalens_query::Settings;
pub use numalens_shape::{query_types, MetricNames, NodeGraph, Output, OutputKind, QueryTypes, Table};

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub status: HealthStatus,
    pub message: String,
}

/// Datasource API surface.
#[async_trait::async_trait]
pub trait LensApi: Send + Sync {
    /// Run one query. `query_type` names the output kind (`Table` or `NodeGraph`),
    /// `body` is the `{"rawQuery": "..."}` envelope.
    async fn query(&self, ctx: &RequestCtx, query_type: &str, body: &[u8]) -> LensResult<Output>;

    /// Output kinds this datasource can produce.
    fn query_types(&self) -> QueryTypes;

    /// Values for dashboard variables: namespaces or resource names.
    async fn metric_names(&self, ctx: &RequestCtx, body: &[u8]) -> LensResult<MetricNames>;

    async fn check_health(&self, ctx: &RequestCtx) -> HealthResult;
}

/// In-process datasource over explicit store and control-plane handles.
pub struct Datasource {
    settings: Settings,
    store: Arc<dyn ResourceStore>,
    control: Arc<dyn ControlPlane>,
}

impl Datasource {
    pub fn new(settings: Settings, store: Arc<dyn ResourceStore>, control: Arc<dyn ControlPlane>) -> Self {
        Self { settings, store, control }
    }

    /// Build from the raw datasource settings JSON.
    pub fn from_settings_json(
        bytes: &[u8],
        store: Arc<dyn ResourceStore>,
        control: Arc<dyn ControlPlane>,
    ) -> LensResult<Self> {
        Ok(Self::new(Settings::from_json(bytes)?, store, control))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn output_len(out: &Output) -> (usize, usize) {
        match out {
            Output::Table(t) => (t.len(), 0),
            Output::NodeGraph(g) => (g.nodes.len(), g.edges.len()),
        }
    }
}

fn result_label(res: &LensResult<Output>) -> &'static str {
    match res {
        Ok(_) => "ok",
        Err(LensError::Validation(_)) => "validation",
        Err(LensError::NotFound(_)) => "not_found",
        Err(LensError::Upstream(_)) => "upstream",
        Err(LensError::Internal(_)) => "internal",
    }
}

#[async_trait::async_trait]
impl LensApi for Datasource {
    async fn query(&self, ctx: &RequestCtx, query_type: &str, body: &[u8]) -> LensResult<Output> {
        let t0 = Instant::now();
        info!(query_type = %query_type, "api: query start");
        let res = match query_type.parse::<OutputKind>() {
            Ok(kind) => match numalens_query::parse(body, &self.settings) {
                Ok(q) => {
                    info!(kind = %q.kind(), name = %q.resource_name(), ns = %q.namespace(), "api: query resolved");
                    numalens_shape::shape(ctx, &q, kind, self.store.as_ref(), self.control.as_ref()).await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        metrics::counter!("queries_total", 1u64, "output" => query_type.to_string(), "result" => result_label(&res));
        match &res {
            Ok(out) => {
                let (rows, edges) = Self::output_len(out);
                info!(rows, edges, took_ms = %t0.elapsed().as_millis(), "api: query ok");
            }
            Err(e) => warn!(error = %e, took_ms = %t0.elapsed().as_millis(), "api: query failed"),
        }
        res
    }

    fn query_types(&self) -> QueryTypes {
        numalens_shape::query_types()
    }

    async fn metric_names(&self, ctx: &RequestCtx, body: &[u8]) -> LensResult<MetricNames> {
        let t0 = Instant::now();
        info!("api: metric_names start");
        let q = numalens_query::parse(body, &self.settings)?;
        let names = numalens_shape::metric_names(ctx, &q, self.store.as_ref()).await?;
        info!(count = names.metric_names.len(), took_ms = %t0.elapsed().as_millis(), "api: metric_names ok");
        Ok(names)
    }

    async fn check_health(&self, ctx: &RequestCtx) -> HealthResult {
        let t0 = Instant::now();
        match self.store.list_namespaces_containing(ctx, ResourceKind::Isbsvc, numalens_core::ALL_NAMESPACES).await {
            Ok(namespaces) => {
                info!(namespaces = namespaces.len(), took_ms = %t0.elapsed().as_millis(), "api: health ok");
                HealthResult { status: HealthStatus::Ok, message: "Data source is working".into() }
            }
            Err(e) => {
                warn!(error = %e, took_ms = %t0.elapsed().as_millis(), "api: health failed");
                HealthResult { status: HealthStatus::Error, message: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numalens_core::{InterStepBufferService, Pipeline, Pod, PodMetrics, Vertex};
    use numalens_kubehub::{MockControlPlane, MockStore};

    fn envelope(raw: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "rawQuery": raw })).expect("envelope")
    }

    fn datasource(settings: Settings) -> Datasource {
        let store = MockStore::new()
            .with_pipeline(Pipeline { namespace: "team-a".into(), name: "p".into(), ..Default::default() })
            .with_pipeline(Pipeline { namespace: "team-b".into(), name: "p".into(), ..Default::default() })
            .with_isbsvc(InterStepBufferService { namespace: "team-a".into(), name: "default".into(), ..Default::default() });
        Datasource::new(settings, Arc::new(store), Arc::new(MockControlPlane::new()))
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl ResourceStore for DownStore {
        async fn list_pipelines(&self, _: &RequestCtx, _: &str) -> LensResult<Vec<Pipeline>> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn get_pipeline(&self, _: &RequestCtx, _: &str, _: &str) -> LensResult<Pipeline> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn list_vertices(&self, _: &RequestCtx, _: &str) -> LensResult<Vec<Vertex>> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn list_pipeline_vertices(&self, _: &RequestCtx, _: &str, _: &str) -> LensResult<Vec<Vertex>> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn get_vertex(&self, _: &RequestCtx, _: &str, _: &str, _: &str) -> LensResult<Vertex> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn list_isbsvcs(&self, _: &RequestCtx, _: &str) -> LensResult<Vec<InterStepBufferService>> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn get_isbsvc(&self, _: &RequestCtx, _: &str, _: &str) -> LensResult<InterStepBufferService> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn list_vertex_pods(&self, _: &RequestCtx, _: &str, _: &str, _: &str) -> LensResult<Vec<Pod>> {
            Err(LensError::Upstream("connection refused".into()))
        }
        async fn get_pod_metrics(&self, _: &RequestCtx, _: &str, _: &str) -> LensResult<PodMetrics> {
            Err(LensError::Upstream("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn pinned_namespace_overrides_the_query() {
        let ds = datasource(Settings::pinned("team-b"));
        let out = ds
            .query(&RequestCtx::new(), "Table", &envelope(r#"{"namespace":"team-a","pipeline":"*"}"#))
            .await
            .expect("query");
        match out {
            Output::Table(Table::Pipelines(rows)) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].namespace, "team-b");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsupported_output_kind_is_rejected() {
        let ds = datasource(Settings::default());
        let err = ds.query(&RequestCtx::new(), "Logs", &envelope(r#"{"pipeline":"*"}"#)).await.unwrap_err();
        assert!(matches!(err, LensError::Validation(m) if m.contains("unsupported output kind")));
    }

    #[tokio::test]
    async fn validation_errors_surface_whole() {
        let ds = datasource(Settings::default());
        let err = ds.query(&RequestCtx::new(), "Table", &envelope(r#"{"pipeline":"p"}"#)).await.unwrap_err();
        assert!(matches!(err, LensError::Validation(_)));
        let err = ds.query(&RequestCtx::new(), "Table", b"not json").await.unwrap_err();
        assert!(matches!(err, LensError::Validation(_)));
    }

    #[tokio::test]
    async fn names_and_query_types() {
        let ds = datasource(Settings::default());
        let names = ds
            .metric_names(&RequestCtx::new(), &envelope(r#"{"namespace":"*","isbsvc":""}"#))
            .await
            .expect("names");
        assert_eq!(names.metric_names, vec!["team-a"]);
        assert_eq!(ds.query_types().query_types, vec!["Table", "NodeGraph"]);
    }

    #[tokio::test]
    async fn health_reports_store_state() {
        let ds = datasource(Settings::default());
        let ok = ds.check_health(&RequestCtx::new()).await;
        assert_eq!(ok, HealthResult { status: HealthStatus::Ok, message: "Data source is working".into() });

        let down = Datasource::new(Settings::default(), Arc::new(DownStore), Arc::new(DetachedControlPlane));
        let res = down.check_health(&RequestCtx::new()).await;
        assert_eq!(res.status, HealthStatus::Error);
        assert!(res.message.contains("connection refused"));
    }
}
