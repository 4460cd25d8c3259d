//! Metric-name discovery: the values a dashboard variable can offer.

use std::collections::BTreeSet;

use numalens_core::{LensError, LensResult, ResourceKind};
use numalens_kubehub::{RequestCtx, ResourceStore};
use numalens_query::{is_all_namespaces, ResolvedQuery};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MetricNames {
    #[serde(rename = "metricNames")]
    pub metric_names: Vec<String>,
}

/// Namespaces holding the kind (all namespaces, empty name), or names of the
/// kind inside one namespace (wildcard name). Any other shape is rejected.
pub async fn metric_names(ctx: &RequestCtx, q: &ResolvedQuery, store: &dyn ResourceStore) -> LensResult<MetricNames> {
    let ns = q.namespace();
    let metric_names = if is_all_namespaces(ns) && q.lists_namespaces() {
        store.list_namespaces_containing(ctx, q.kind(), ns).await?
    } else if !is_all_namespaces(ns) && !q.is_multi_namespace() && q.is_wildcard() {
        match q.kind() {
            ResourceKind::Pipeline => store.list_pipelines(ctx, ns).await?.into_iter().map(|p| p.name).collect(),
            // Vertex names repeat across pipelines.
            ResourceKind::Vertex => store
                .list_vertices(ctx, ns)
                .await?
                .into_iter()
                .filter(|v| q.matches_pipeline(&v.pipeline))
                .map(|v| v.name)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            ResourceKind::Isbsvc => store.list_isbsvcs(ctx, ns).await?.into_iter().map(|i| i.name).collect(),
        }
    } else {
        return Err(LensError::Validation("query format is invalid".into()));
    };
    Ok(MetricNames { metric_names })
}
