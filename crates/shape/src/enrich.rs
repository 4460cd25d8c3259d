//! Best-effort metric enrichment.
//!
//! Every function here returns `Result<_, Unavailable>`. Failures are logged and
//! counted, never turned into request errors; callers render an empty field.

use chrono::{DateTime, Utc};
use numalens_core::{Vertex, VertexMetricSample, DEFAULT_METRIC_KEY, PENDING_NOT_AVAILABLE, RATE_NOT_AVAILABLE};
use numalens_kubehub::{ControlPlane, RequestCtx, ResourceStore};
use tracing::debug;

/// Why an enriched field has no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unavailable {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("value absent")]
    Missing,
    #[error("value not available")]
    Sentinel,
}

/// Aggregate resource usage across all pods of a vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodUsage {
    pub cpu_milli: i64,
    /// Sum of per-container memory, each rounded up to whole megabytes.
    pub memory_mb: i64,
}

fn degrade(field: &'static str, v: &Vertex, why: Unavailable) -> Unavailable {
    match &why {
        Unavailable::Fetch(e) => debug!(
            field,
            namespace = %v.namespace,
            pipeline = %v.pipeline,
            vertex = %v.name,
            error = %e,
            "enrichment fetch failed"
        ),
        other => debug!(
            field,
            namespace = %v.namespace,
            pipeline = %v.pipeline,
            vertex = %v.name,
            reason = %other,
            "enrichment value unavailable"
        ),
    }
    metrics::counter!("enrichment_unavailable_total", 1u64, "field" => field);
    why
}

/// Fetch the daemon's metric sample for a vertex.
pub async fn vertex_metrics(
    ctx: &RequestCtx,
    cp: &dyn ControlPlane,
    v: &Vertex,
) -> Result<VertexMetricSample, Unavailable> {
    cp.get_vertex_metrics(ctx, &v.namespace, &v.pipeline, &v.name)
        .await
        .map_err(|e| degrade("vertex_metrics", v, Unavailable::Fetch(e.to_string())))
}

/// Aggregate rate from a sample. Absent, negative and sentinel values are unavailable.
pub fn rate_from_sample(sample: &VertexMetricSample) -> Result<f64, Unavailable> {
    let rate = *sample.processing_rates.get(DEFAULT_METRIC_KEY).ok_or(Unavailable::Missing)?;
    if rate == RATE_NOT_AVAILABLE || rate.is_nan() || rate < 0.0 {
        return Err(Unavailable::Sentinel);
    }
    Ok(rate)
}

pub fn pending_from_sample(sample: &VertexMetricSample) -> Result<i64, Unavailable> {
    let pending = *sample.pendings.get(DEFAULT_METRIC_KEY).ok_or(Unavailable::Missing)?;
    if pending == PENDING_NOT_AVAILABLE || pending < 0 {
        return Err(Unavailable::Sentinel);
    }
    Ok(pending)
}

pub async fn processing_rate(ctx: &RequestCtx, cp: &dyn ControlPlane, v: &Vertex) -> Result<f64, Unavailable> {
    let sample = vertex_metrics(ctx, cp, v).await?;
    rate_from_sample(&sample).map_err(|why| degrade("processing_rate", v, why))
}

pub async fn pending_count(ctx: &RequestCtx, cp: &dyn ControlPlane, v: &Vertex) -> Result<i64, Unavailable> {
    let sample = vertex_metrics(ctx, cp, v).await?;
    pending_from_sample(&sample).map_err(|why| degrade("pending", v, why))
}

pub async fn watermark(ctx: &RequestCtx, cp: &dyn ControlPlane, v: &Vertex) -> Result<DateTime<Utc>, Unavailable> {
    let wm = cp
        .get_vertex_watermark(ctx, &v.namespace, &v.pipeline, &v.name)
        .await
        .map_err(|e| degrade("watermark", v, Unavailable::Fetch(e.to_string())))?;
    let millis = wm.watermark.ok_or_else(|| degrade("watermark", v, Unavailable::Missing))?;
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| degrade("watermark", v, Unavailable::Sentinel))
}

/// Sum CPU and memory over the vertex's pods. A single failed pod makes the
/// whole aggregate unavailable; so does a vertex without pods.
pub async fn pod_usage(ctx: &RequestCtx, store: &dyn ResourceStore, v: &Vertex) -> Result<PodUsage, Unavailable> {
    let pods = store
        .list_vertex_pods(ctx, &v.namespace, &v.pipeline, &v.name)
        .await
        .map_err(|e| degrade("pod_usage", v, Unavailable::Fetch(e.to_string())))?;
    if pods.is_empty() {
        return Err(degrade("pod_usage", v, Unavailable::Missing));
    }
    let mut usage = PodUsage::default();
    for pod in &pods {
        let m = store
            .get_pod_metrics(ctx, &v.namespace, &pod.name)
            .await
            .map_err(|e| degrade("pod_usage", v, Unavailable::Fetch(format!("pod {}: {}", pod.name, e))))?;
        for c in &m.containers {
            usage = add_container(usage, c.cpu_milli, c.memory_bytes)
                .ok_or_else(|| degrade("pod_usage", v, Unavailable::Sentinel))?;
        }
    }
    Ok(usage)
}

/// `None` when the running totals overflow.
fn add_container(usage: PodUsage, cpu_milli: i64, memory_bytes: i64) -> Option<PodUsage> {
    let memory_mb = memory_bytes / 1_000_000 + i64::from(memory_bytes % 1_000_000 > 0);
    Some(PodUsage {
        cpu_milli: usage.cpu_milli.checked_add(cpu_milli)?,
        memory_mb: usage.memory_mb.checked_add(memory_mb)?,
    })
}

/// `"<rate rounded to 2 decimals> msg/s"`.
pub fn format_rate(rate: f64) -> String {
    format!("{} msg/s", round2(rate))
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use numalens_kubehub::MockControlPlane;
    use std::collections::HashMap;

    fn sample(rate: Option<f64>, pending: Option<i64>) -> VertexMetricSample {
        let mut processing_rates = HashMap::new();
        let mut pendings = HashMap::new();
        if let Some(r) = rate {
            processing_rates.insert(DEFAULT_METRIC_KEY.to_string(), r);
        }
        if let Some(p) = pending {
            pendings.insert(DEFAULT_METRIC_KEY.to_string(), p);
        }
        VertexMetricSample { processing_rates, pendings }
    }

    #[test]
    fn rate_rules() {
        assert_eq!(rate_from_sample(&sample(Some(12.5), None)), Ok(12.5));
        assert_eq!(rate_from_sample(&sample(Some(0.0), None)), Ok(0.0));
        assert_eq!(rate_from_sample(&sample(None, None)), Err(Unavailable::Missing));
        assert_eq!(rate_from_sample(&sample(Some(-1.0), None)), Err(Unavailable::Sentinel));
        assert_eq!(rate_from_sample(&sample(Some(RATE_NOT_AVAILABLE), None)), Err(Unavailable::Sentinel));
    }

    #[test]
    fn other_keys_are_ignored() {
        let mut s = sample(None, None);
        s.processing_rates.insert("1m".into(), 3.0);
        s.pendings.insert("1m".into(), 3);
        assert_eq!(rate_from_sample(&s), Err(Unavailable::Missing));
        assert_eq!(pending_from_sample(&s), Err(Unavailable::Missing));
    }

    #[test]
    fn pending_rules() {
        assert_eq!(pending_from_sample(&sample(None, Some(42))), Ok(42));
        assert_eq!(pending_from_sample(&sample(None, Some(-5))), Err(Unavailable::Sentinel));
        assert_eq!(pending_from_sample(&sample(None, Some(PENDING_NOT_AVAILABLE))), Err(Unavailable::Sentinel));
    }

    #[test]
    fn container_totals_round_memory_up_and_stop_on_overflow() {
        let u = add_container(PodUsage::default(), 250, 20_971_520).expect("sum");
        assert_eq!(u, PodUsage { cpu_milli: 250, memory_mb: 21 });
        let u = add_container(u, 3, 1_000_000).expect("sum");
        assert_eq!(u, PodUsage { cpu_milli: 253, memory_mb: 22 });
        assert_eq!(add_container(PodUsage::default(), 0, i64::MAX).map(|u| u.memory_mb), Some(i64::MAX / 1_000_000 + 1));
        assert_eq!(add_container(PodUsage { cpu_milli: i64::MAX - 1, memory_mb: 0 }, 2, 0), None);
        assert_eq!(add_container(PodUsage { cpu_milli: 0, memory_mb: i64::MAX }, 0, 1), None);
    }

    #[tokio::test]
    async fn pending_count_reads_the_default_key() {
        let v = Vertex { namespace: "ns".into(), pipeline: "p".into(), name: "in".into(), ..Default::default() };
        let cp = MockControlPlane::new()
            .with_metrics("ns", "p", "in", sample(Some(1.0), Some(7)))
            .with_metrics("ns", "p", "stuck", sample(Some(1.0), Some(PENDING_NOT_AVAILABLE)));
        let ctx = RequestCtx::new();
        assert_eq!(pending_count(&ctx, &cp, &v).await, Ok(7));

        let stuck = Vertex { name: "stuck".into(), ..v.clone() };
        assert_eq!(pending_count(&ctx, &cp, &stuck).await, Err(Unavailable::Sentinel));

        let gone = Vertex { name: "gone".into(), ..v };
        assert!(matches!(pending_count(&ctx, &cp, &gone).await, Err(Unavailable::Fetch(_))));
    }

    #[test]
    fn rate_formatting() {
        assert_eq!(format_rate(3.14159), "3.14 msg/s");
        assert_eq!(format_rate(2.0), "2 msg/s");
        assert_eq!(format_rate(0.005), "0.01 msg/s");
    }
}
