//! Table shaping: one row per resource, columns per [`TableKind`].

use std::fmt::Display;

use numalens_core::columns::TableKind;
use numalens_core::{
    format_creation, format_timestamp, InterStepBufferService, IsbsvcType, LensResult, Pipeline, Vertex,
    VertexKind,
};
use numalens_kubehub::{ControlPlane, RequestCtx, ResourceStore};
use numalens_query::{ResolvedQuery, Resource};
use serde::Serialize;
use tracing::debug;

use crate::enrich;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceRow {
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRow {
    pub namespace: String,
    pub name: String,
    pub phase: String,
    pub vertices: Option<u32>,
    pub sources: Option<u32>,
    pub sinks: Option<u32>,
    #[serde(rename = "UDFs")]
    pub udfs: Option<u32>,
    #[serde(rename = "creation time")]
    pub creation_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexRow {
    pub namespace: String,
    pub pipeline: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<VertexKind>,
    pub phase: String,
    pub replicas: u32,
    #[serde(rename = "desired replicas")]
    pub desired_replicas: i32,
    #[serde(rename = "processing rate")]
    pub processing_rate: Option<f64>,
    #[serde(rename = "pending messages")]
    pub pending_messages: Option<i64>,
    pub watermark: Option<String>,
    /// Milli-cores.
    #[serde(rename = "cpu usage")]
    pub cpu_usage: Option<i64>,
    /// Megabytes.
    #[serde(rename = "memory usage")]
    pub memory_usage: Option<i64>,
    #[serde(rename = "creation time")]
    pub creation_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsbsvcRow {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<IsbsvcType>,
    pub phase: String,
    #[serde(rename = "creation time")]
    pub creation_time: Option<String>,
}

/// A shaped table. Serializes as `{"frame": <name>, "rows": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "frame", content = "rows", rename_all = "lowercase")]
pub enum Table {
    Namespaces(Vec<NamespaceRow>),
    Pipelines(Vec<PipelineRow>),
    Vertices(Vec<VertexRow>),
    Isbsvcs(Vec<IsbsvcRow>),
}

fn cell<T: Display>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_default()
}

impl NamespaceRow {
    pub fn cells(&self) -> Vec<String> {
        vec![self.namespace.clone()]
    }
}

impl PipelineRow {
    fn from_pipeline(p: Pipeline) -> Self {
        Self {
            creation_time: format_creation(&p.created),
            namespace: p.namespace,
            name: p.name,
            phase: p.phase,
            vertices: p.vertex_count,
            sources: p.source_count,
            sinks: p.sink_count,
            udfs: p.udf_count,
        }
    }

    pub fn cells(&self) -> Vec<String> {
        vec![
            self.namespace.clone(),
            self.name.clone(),
            self.phase.clone(),
            cell(&self.vertices),
            cell(&self.sources),
            cell(&self.sinks),
            cell(&self.udfs),
            cell(&self.creation_time),
        ]
    }
}

impl VertexRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.namespace.clone(),
            self.pipeline.clone(),
            self.name.clone(),
            self.kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
            self.phase.clone(),
            self.replicas.to_string(),
            self.desired_replicas.to_string(),
            cell(&self.processing_rate),
            cell(&self.pending_messages),
            cell(&self.watermark),
            self.cpu_usage.map(|c| format!("{}m", c)).unwrap_or_default(),
            self.memory_usage.map(|m| format!("{}M", m)).unwrap_or_default(),
            cell(&self.creation_time),
        ]
    }
}

impl IsbsvcRow {
    fn from_isbsvc(i: InterStepBufferService) -> Self {
        Self {
            kind: i.backing_type(),
            creation_time: format_creation(&i.created),
            namespace: i.namespace,
            name: i.name,
            phase: i.phase,
        }
    }

    pub fn cells(&self) -> Vec<String> {
        vec![
            self.namespace.clone(),
            self.name.clone(),
            self.kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
            self.phase.clone(),
            cell(&self.creation_time),
        ]
    }
}

impl Table {
    pub fn kind(&self) -> TableKind {
        match self {
            Table::Namespaces(_) => TableKind::Namespaces,
            Table::Pipelines(_) => TableKind::Pipelines,
            Table::Vertices(_) => TableKind::Vertices,
            Table::Isbsvcs(_) => TableKind::Isbsvcs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Table::Namespaces(r) => r.len(),
            Table::Pipelines(r) => r.len(),
            Table::Vertices(r) => r.len(),
            Table::Isbsvcs(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rendered cells, aligned with `columns_for(self.kind())`.
    pub fn cells(&self) -> Vec<Vec<String>> {
        match self {
            Table::Namespaces(r) => r.iter().map(NamespaceRow::cells).collect(),
            Table::Pipelines(r) => r.iter().map(PipelineRow::cells).collect(),
            Table::Vertices(r) => r.iter().map(VertexRow::cells).collect(),
            Table::Isbsvcs(r) => r.iter().map(IsbsvcRow::cells).collect(),
        }
    }
}

async fn vertex_row(ctx: &RequestCtx, store: &dyn ResourceStore, cp: &dyn ControlPlane, v: Vertex) -> VertexRow {
    let (processing_rate, pending_messages) = match enrich::vertex_metrics(ctx, cp, &v).await {
        Ok(sample) => (enrich::rate_from_sample(&sample).ok(), enrich::pending_from_sample(&sample).ok()),
        Err(_) => (None, None),
    };
    let watermark = enrich::watermark(ctx, cp, &v).await.ok().map(|t| format_timestamp(&t));
    let usage = enrich::pod_usage(ctx, store, &v).await.ok();
    VertexRow {
        kind: v.kind(),
        desired_replicas: v.desired_replicas_or_default(),
        creation_time: format_creation(&v.created),
        replicas: v.replicas,
        processing_rate,
        pending_messages,
        watermark,
        cpu_usage: usage.map(|u| u.cpu_milli),
        memory_usage: usage.map(|u| u.memory_mb),
        namespace: v.namespace,
        pipeline: v.pipeline,
        name: v.name,
        phase: v.phase,
    }
}

/// Build the table for a resolved query. Store failures fail the whole table;
/// enrichment gaps only blank the affected cells.
pub async fn build_table(
    ctx: &RequestCtx,
    q: &ResolvedQuery,
    store: &dyn ResourceStore,
    cp: &dyn ControlPlane,
) -> LensResult<Table> {
    let scope = q.effective_namespace();
    if q.lists_namespaces() {
        let namespaces = store.list_namespaces_containing(ctx, q.kind(), scope).await?;
        return Ok(Table::Namespaces(namespaces.into_iter().map(|namespace| NamespaceRow { namespace }).collect()));
    }
    let table = match q.resource() {
        Resource::Pipeline { name } => {
            let pipelines = if q.is_wildcard() {
                let all = store.list_pipelines(ctx, scope).await?;
                all.into_iter().filter(|p| q.matches_namespace(&p.namespace)).collect()
            } else {
                vec![store.get_pipeline(ctx, q.namespace(), name).await?]
            };
            Table::Pipelines(pipelines.into_iter().map(PipelineRow::from_pipeline).collect())
        }
        Resource::Vertex { pipeline, name } => {
            let vertices: Vec<Vertex> = if q.is_wildcard() {
                let all = store.list_vertices(ctx, scope).await?;
                all.into_iter()
                    .filter(|v| q.matches_namespace(&v.namespace) && q.matches_pipeline(&v.pipeline))
                    .collect()
            } else {
                vec![store.get_vertex(ctx, q.namespace(), pipeline, name).await?]
            };
            let mut rows = Vec::with_capacity(vertices.len());
            for v in vertices {
                rows.push(vertex_row(ctx, store, cp, v).await);
            }
            Table::Vertices(rows)
        }
        Resource::Isbsvc { name } => {
            let isbsvcs = if q.is_wildcard() {
                let all = store.list_isbsvcs(ctx, scope).await?;
                all.into_iter().filter(|i| q.matches_namespace(&i.namespace)).collect()
            } else {
                vec![store.get_isbsvc(ctx, q.namespace(), name).await?]
            };
            Table::Isbsvcs(isbsvcs.into_iter().map(IsbsvcRow::from_isbsvc).collect())
        }
    };
    debug!(frame = table.kind().frame_name(), rows = table.len(), "table built");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use numalens_core::columns::columns_for;
    use numalens_core::IsbsvcBacking;

    #[test]
    fn cells_align_with_columns() {
        let p = PipelineRow::from_pipeline(Pipeline { namespace: "ns".into(), name: "p".into(), ..Default::default() });
        assert_eq!(p.cells().len(), columns_for(TableKind::Pipelines).len());
        let i = IsbsvcRow::from_isbsvc(InterStepBufferService {
            backing: IsbsvcBacking { redis: Some(false), jetstream: false },
            ..Default::default()
        });
        assert_eq!(i.cells().len(), columns_for(TableKind::Isbsvcs).len());
        assert_eq!(i.cells()[2], "redis (internal)");
        let t = Table::Namespaces(vec![NamespaceRow { namespace: "a".into() }]);
        assert_eq!(t.cells()[0].len(), columns_for(TableKind::Namespaces).len());
    }

    #[test]
    fn json_field_names_match_column_labels() {
        let row = PipelineRow::from_pipeline(Pipeline::default());
        let v = serde_json::to_value(&row).expect("serialize");
        let keys: Vec<&str> = v.as_object().expect("object").keys().map(|k| k.as_str()).collect();
        for col in columns_for(TableKind::Pipelines) {
            assert!(keys.contains(&col.label), "missing {}", col.label);
        }
        let t = serde_json::to_value(Table::Pipelines(vec![])).expect("serialize");
        assert_eq!(t["frame"], "pipelines");
    }
}
