//! Numalens kubehub: the capabilities the shaping layer consumes.
//!
//! [`ResourceStore`] lists and gets Numaflow resources, pods and pod metrics;
//! [`ControlPlane`] answers per-pipeline runtime questions (buffers, rates,
//! watermarks). Both are passed explicitly to the shapers so tests can swap in
//! [`MockStore`] and [`MockControlPlane`].

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use numalens_core::prelude::*;

pub mod convert;
mod kube_store;
mod mock;

pub use kube_store::KubeStore;
pub use mock::{MockControlPlane, MockStore};

/// Per-request context handed to every capability call.
///
/// The core never times out on its own; implementations are expected to honor
/// `deadline`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCtx {
    pub deadline: Option<Instant>,
}

impl RequestCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Some(Instant::now() + timeout) }
    }

    /// Time left before the deadline; zero once it passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Read-only access to Numaflow resources and pod metrics.
///
/// `scope` is a namespace, or the empty string for every namespace.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn list_pipelines(&self, ctx: &RequestCtx, scope: &str) -> LensResult<Vec<Pipeline>>;

    async fn get_pipeline(&self, ctx: &RequestCtx, namespace: &str, name: &str) -> LensResult<Pipeline>;

    async fn list_vertices(&self, ctx: &RequestCtx, scope: &str) -> LensResult<Vec<Vertex>>;

    async fn list_pipeline_vertices(
        &self,
        ctx: &RequestCtx,
        scope: &str,
        pipeline: &str,
    ) -> LensResult<Vec<Vertex>>;

    /// Fails with [`LensError::NotFound`] when the vertex does not exist.
    async fn get_vertex(
        &self,
        ctx: &RequestCtx,
        namespace: &str,
        pipeline: &str,
        name: &str,
    ) -> LensResult<Vertex>;

    async fn list_isbsvcs(&self, ctx: &RequestCtx, scope: &str) -> LensResult<Vec<InterStepBufferService>>;

    async fn get_isbsvc(&self, ctx: &RequestCtx, namespace: &str, name: &str) -> LensResult<InterStepBufferService>;

    /// Distinct, sorted namespaces holding at least one resource of `kind`.
    async fn list_namespaces_containing(
        &self,
        ctx: &RequestCtx,
        kind: ResourceKind,
        scope: &str,
    ) -> LensResult<Vec<String>> {
        let namespaces: BTreeSet<String> = match kind {
            ResourceKind::Pipeline => {
                self.list_pipelines(ctx, scope).await?.into_iter().map(|p| p.namespace).collect()
            }
            ResourceKind::Vertex => {
                self.list_vertices(ctx, scope).await?.into_iter().map(|v| v.namespace).collect()
            }
            ResourceKind::Isbsvc => {
                self.list_isbsvcs(ctx, scope).await?.into_iter().map(|i| i.namespace).collect()
            }
        };
        Ok(namespaces.into_iter().collect())
    }

    async fn list_vertex_pods(
        &self,
        ctx: &RequestCtx,
        namespace: &str,
        pipeline: &str,
        vertex: &str,
    ) -> LensResult<Vec<Pod>>;

    async fn get_pod_metrics(&self, ctx: &RequestCtx, namespace: &str, pod: &str) -> LensResult<PodMetrics>;
}

/// Runtime view of a single pipeline, served by its daemon.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_pipeline_edges(&self, ctx: &RequestCtx, namespace: &str, pipeline: &str) -> LensResult<Vec<Edge>>;

    async fn get_pipeline_edge(
        &self,
        ctx: &RequestCtx,
        namespace: &str,
        pipeline: &str,
        edge: &str,
    ) -> LensResult<Edge>;

    async fn get_vertex_metrics(
        &self,
        ctx: &RequestCtx,
        namespace: &str,
        pipeline: &str,
        vertex: &str,
    ) -> LensResult<VertexMetricSample>;

    async fn get_vertex_watermark(
        &self,
        ctx: &RequestCtx,
        namespace: &str,
        pipeline: &str,
        vertex: &str,
    ) -> LensResult<Watermark>;
}

/// Control plane used when no daemon transport is wired in. Every call fails,
/// so enrichment degrades to unavailable and node graphs report the error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedControlPlane;

impl DetachedControlPlane {
    fn err<T>(pipeline: &str) -> LensResult<T> {
        Err(LensError::Upstream(format!("no control plane configured for pipeline {}", pipeline)))
    }
}

#[async_trait::async_trait]
impl ControlPlane for DetachedControlPlane {
    async fn list_pipeline_edges(&self, _ctx: &RequestCtx, _namespace: &str, pipeline: &str) -> LensResult<Vec<Edge>> {
        Self::err(pipeline)
    }

    async fn get_pipeline_edge(&self, _ctx: &RequestCtx, _namespace: &str, pipeline: &str, _edge: &str) -> LensResult<Edge> {
        Self::err(pipeline)
    }

    async fn get_vertex_metrics(
        &self,
        _ctx: &RequestCtx,
        _namespace: &str,
        pipeline: &str,
        _vertex: &str,
    ) -> LensResult<VertexMetricSample> {
        Self::err(pipeline)
    }

    async fn get_vertex_watermark(
        &self,
        _ctx: &RequestCtx,
        _namespace: &str,
        pipeline: &str,
        _vertex: &str,
    ) -> LensResult<Watermark> {
        Self::err(pipeline)
    }
}
