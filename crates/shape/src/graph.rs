//! Node-graph shaping for a single pipeline.

use numalens_core::{format_timestamp, Edge, LensError, LensResult, Vertex, WILDCARD};
use numalens_kubehub::{ControlPlane, RequestCtx, ResourceStore};
use numalens_query::{is_multi_filter, ResolvedQuery, Resource};
use serde::Serialize;
use tracing::debug;

use crate::enrich;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRow {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub mainstat: Option<String>,
    pub secondarystat: Option<String>,
    #[serde(rename = "arc__success")]
    pub arc_success: f32,
    #[serde(rename = "arc__failure")]
    pub arc_failure: f32,
    #[serde(rename = "arc__neutral")]
    pub arc_neutral: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeRow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub mainstat: Option<String>,
    pub secondarystat: Option<String>,
}

/// Nodes and edges in the order the store and control plane returned them.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NodeGraph {
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

async fn node_row(ctx: &RequestCtx, cp: &dyn ControlPlane, v: &Vertex) -> NodeRow {
    let mainstat = enrich::processing_rate(ctx, cp, v).await.ok().map(enrich::format_rate);
    let secondarystat = enrich::watermark(ctx, cp, v).await.ok().map(|t| format_timestamp(&t));
    let (arc_success, arc_failure, arc_neutral) = v.health().arcs();
    NodeRow {
        id: v.name.clone(),
        title: v.name.clone(),
        subtitle: format!("{}/{}", v.replicas, v.desired_replicas_or_default()),
        mainstat,
        secondarystat,
        arc_success,
        arc_failure,
        arc_neutral,
    }
}

fn endpoint(value: &Option<String>, which: &str, e: &Edge) -> LensResult<String> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(LensError::Upstream(format!(
            "edge {} has no {} vertex",
            e.buffer_name.as_deref().unwrap_or("<unnamed>"),
            which
        ))),
    }
}

fn edge_row(e: &Edge) -> LensResult<EdgeRow> {
    let source = endpoint(&e.from_vertex, "source", e)?;
    let target = endpoint(&e.to_vertex, "target", e)?;
    let mainstat = match (e.pending_count, e.ack_pending_count) {
        (Some(p), Some(a)) => Some(p.saturating_add(a).to_string()),
        _ => None,
    };
    Ok(EdgeRow {
        id: format!("{}-{}", source, target),
        source,
        target,
        mainstat,
        secondarystat: e.buffer_usage.map(|u| format!("{}%", u)),
    })
}

/// Build the node graph of exactly one named pipeline.
pub async fn build_graph(
    ctx: &RequestCtx,
    q: &ResolvedQuery,
    store: &dyn ResourceStore,
    cp: &dyn ControlPlane,
) -> LensResult<NodeGraph> {
    let Resource::Pipeline { name } = q.resource() else {
        return Err(LensError::Validation(format!(
            "node graph requires a pipeline query, got {}",
            q.kind()
        )));
    };
    if name.is_empty() || name == WILDCARD || is_multi_filter(name) {
        return Err(LensError::Validation("node graph supports exactly one pipeline per query".into()));
    }
    let pipeline = store.get_pipeline(ctx, q.namespace(), name).await?;
    let vertices = store.list_pipeline_vertices(ctx, q.namespace(), &pipeline.name).await?;
    let edges = cp.list_pipeline_edges(ctx, q.namespace(), &pipeline.name).await?;

    let mut graph = NodeGraph::default();
    for v in &vertices {
        graph.nodes.push(node_row(ctx, cp, v).await);
    }
    for e in &edges {
        graph.edges.push(edge_row(e)?);
    }
    debug!(pipeline = %pipeline.name, nodes = graph.nodes.len(), edges = graph.edges.len(), "node graph built");
    Ok(graph)
}
