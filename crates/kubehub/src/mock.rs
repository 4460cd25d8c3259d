//! In-memory capabilities for tests and local demos.

use std::collections::HashMap;
use std::sync::Mutex;

use numalens_core::{
    Edge, InterStepBufferService, LensError, LensResult, Pipeline, Pod, PodMetrics, Vertex,
    VertexMetricSample, Watermark,
};

use crate::{ControlPlane, RequestCtx, ResourceStore};

fn in_scope(scope: &str, namespace: &str) -> bool {
    scope.is_empty() || scope == "*" || scope == namespace
}

fn vertex_key(namespace: &str, pipeline: &str, vertex: &str) -> String {
    format!("{}/{}/{}", namespace, pipeline, vertex)
}

/// Fixed snapshot of resources. Every list call records its scope in `calls`.
#[derive(Debug, Default)]
pub struct MockStore {
    pub pipelines: Vec<Pipeline>,
    pub vertices: Vec<Vertex>,
    pub isbsvcs: Vec<InterStepBufferService>,
    /// Keyed by `namespace/pipeline/vertex`.
    pub pods: HashMap<String, Vec<Pod>>,
    /// Keyed by pod name; a missing entry fails the lookup.
    pub pod_metrics: HashMap<String, PodMetrics>,
    pub calls: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, p: Pipeline) -> Self {
        self.pipelines.push(p);
        self
    }

    pub fn with_vertex(mut self, v: Vertex) -> Self {
        self.vertices.push(v);
        self
    }

    pub fn with_isbsvc(mut self, i: InterStepBufferService) -> Self {
        self.isbsvcs.push(i);
        self
    }

    pub fn with_pods(mut self, namespace: &str, pipeline: &str, vertex: &str, names: &[&str]) -> Self {
        let pods = names
            .iter()
            .map(|n| Pod { namespace: namespace.to_string(), name: n.to_string() })
            .collect();
        self.pods.insert(vertex_key(namespace, pipeline, vertex), pods);
        self
    }

    pub fn with_pod_metrics(mut self, pod: &str, metrics: PodMetrics) -> Self {
        self.pod_metrics.insert(pod.to_string(), metrics);
        self
    }

    /// Scopes passed to list calls, in order.
    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: &str, scope: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{}:{}", call, scope));
        }
    }
}

#[async_trait::async_trait]
impl ResourceStore for MockStore {
    async fn list_pipelines(&self, _ctx: &RequestCtx, scope: &str) -> LensResult<Vec<Pipeline>> {
        self.record("list_pipelines", scope);
        Ok(self.pipelines.iter().filter(|p| in_scope(scope, &p.namespace)).cloned().collect())
    }

    async fn get_pipeline(&self, _ctx: &RequestCtx, namespace: &str, name: &str) -> LensResult<Pipeline> {
        self.pipelines
            .iter()
            .find(|p| p.namespace == namespace && p.name == name)
            .cloned()
            .ok_or_else(|| LensError::NotFound(format!("pipeline {}/{}", namespace, name)))
    }

    async fn list_vertices(&self, _ctx: &RequestCtx, scope: &str) -> LensResult<Vec<Vertex>> {
        self.record("list_vertices", scope);
        Ok(self.vertices.iter().filter(|v| in_scope(scope, &v.namespace)).cloned().collect())
    }

    async fn list_pipeline_vertices(&self, _ctx: &RequestCtx, scope: &str, pipeline: &str) -> LensResult<Vec<Vertex>> {
        self.record("list_pipeline_vertices", scope);
        Ok(self
            .vertices
            .iter()
            .filter(|v| in_scope(scope, &v.namespace) && v.pipeline == pipeline)
            .cloned()
            .collect())
    }

    async fn get_vertex(&self, _ctx: &RequestCtx, namespace: &str, pipeline: &str, name: &str) -> LensResult<Vertex> {
        self.vertices
            .iter()
            .find(|v| v.namespace == namespace && v.pipeline == pipeline && v.name == name)
            .cloned()
            .ok_or_else(|| LensError::NotFound(format!("vertex {}", vertex_key(namespace, pipeline, name))))
    }

    async fn list_isbsvcs(&self, _ctx: &RequestCtx, scope: &str) -> LensResult<Vec<InterStepBufferService>> {
        self.record("list_isbsvcs", scope);
        Ok(self.isbsvcs.iter().filter(|i| in_scope(scope, &i.namespace)).cloned().collect())
    }

    async fn get_isbsvc(&self, _ctx: &RequestCtx, namespace: &str, name: &str) -> LensResult<InterStepBufferService> {
        self.isbsvcs
            .iter()
            .find(|i| i.namespace == namespace && i.name == name)
            .cloned()
            .ok_or_else(|| LensError::NotFound(format!("isbsvc {}/{}", namespace, name)))
    }

    async fn list_vertex_pods(&self, _ctx: &RequestCtx, namespace: &str, pipeline: &str, vertex: &str) -> LensResult<Vec<Pod>> {
        Ok(self.pods.get(&vertex_key(namespace, pipeline, vertex)).cloned().unwrap_or_default())
    }

    async fn get_pod_metrics(&self, _ctx: &RequestCtx, _namespace: &str, pod: &str) -> LensResult<PodMetrics> {
        self.pod_metrics
            .get(pod)
            .cloned()
            .ok_or_else(|| LensError::Upstream(format!("no metrics for pod {}", pod)))
    }
}

/// Canned daemon answers. Missing entries fail with [`LensError::Upstream`].
#[derive(Debug, Default)]
pub struct MockControlPlane {
    /// Keyed by `namespace/pipeline`.
    pub edges: HashMap<String, Vec<Edge>>,
    /// Keyed by `namespace/pipeline/vertex`.
    pub metrics: HashMap<String, VertexMetricSample>,
    /// Keyed by `namespace/pipeline/vertex`.
    pub watermarks: HashMap<String, Watermark>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edges(mut self, namespace: &str, pipeline: &str, edges: Vec<Edge>) -> Self {
        self.edges.insert(format!("{}/{}", namespace, pipeline), edges);
        self
    }

    pub fn with_metrics(mut self, namespace: &str, pipeline: &str, vertex: &str, sample: VertexMetricSample) -> Self {
        self.metrics.insert(vertex_key(namespace, pipeline, vertex), sample);
        self
    }

    pub fn with_watermark(mut self, namespace: &str, pipeline: &str, vertex: &str, wm: Watermark) -> Self {
        self.watermarks.insert(vertex_key(namespace, pipeline, vertex), wm);
        self
    }
}

#[async_trait::async_trait]
impl ControlPlane for MockControlPlane {
    async fn list_pipeline_edges(&self, _ctx: &RequestCtx, namespace: &str, pipeline: &str) -> LensResult<Vec<Edge>> {
        self.edges
            .get(&format!("{}/{}", namespace, pipeline))
            .cloned()
            .ok_or_else(|| LensError::Upstream(format!("no daemon for pipeline {}/{}", namespace, pipeline)))
    }

    async fn get_pipeline_edge(&self, ctx: &RequestCtx, namespace: &str, pipeline: &str, edge: &str) -> LensResult<Edge> {
        self.list_pipeline_edges(ctx, namespace, pipeline)
            .await?
            .into_iter()
            .find(|e| e.buffer_name.as_deref() == Some(edge))
            .ok_or_else(|| LensError::NotFound(format!("edge {}", edge)))
    }

    async fn get_vertex_metrics(
        &self,
        _ctx: &RequestCtx,
        namespace: &str,
        pipeline: &str,
        vertex: &str,
    ) -> LensResult<VertexMetricSample> {
        let key = vertex_key(namespace, pipeline, vertex);
        self.metrics.get(&key).cloned().ok_or_else(|| LensError::Upstream(format!("no metrics for {}", key)))
    }

    async fn get_vertex_watermark(
        &self,
        _ctx: &RequestCtx,
        namespace: &str,
        pipeline: &str,
        vertex: &str,
    ) -> LensResult<Watermark> {
        let key = vertex_key(namespace, pipeline, vertex);
        self.watermarks.get(&key).cloned().ok_or_else(|| LensError::Upstream(format!("no watermark for {}", key)))
    }
}
