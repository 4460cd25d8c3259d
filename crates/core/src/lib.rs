//! Numalens core types: read-only snapshots of Numaflow resources and their classification.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub mod columns;

/// Namespace scope meaning "every namespace" when listing.
pub const ALL_NAMESPACES: &str = "";

/// Wildcard resource name: list everything of a kind.
pub const WILDCARD: &str = "*";

/// Sentinel the daemon reports when a processing rate cannot be computed yet.
pub const RATE_NOT_AVAILABLE: f64 = i64::MIN as f64;

/// Sentinel the daemon reports when a pending count cannot be computed yet.
pub const PENDING_NOT_AVAILABLE: i64 = i64::MIN;

/// Key of the aggregate entry in vertex rate/pending maps.
pub const DEFAULT_METRIC_KEY: &str = "default";

/// Errors surfaced by query resolution and shaping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum LensError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type LensResult<T> = Result<T, LensError>;

/// The resource kinds a query can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pipeline,
    Vertex,
    Isbsvc,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Vertex => "vertex",
            ResourceKind::Isbsvc => "isbsvc",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub namespace: String,
    pub name: String,
    pub phase: String,
    pub vertex_count: Option<u32>,
    pub source_count: Option<u32>,
    pub sink_count: Option<u32>,
    pub udf_count: Option<u32>,
    pub created: Option<DateTime<Utc>>,
}

/// User-defined function flavor of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Udf {
    Map,
    /// A UDF with a `groupBy` section.
    Reduce,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vertex {
    pub namespace: String,
    pub pipeline: String,
    pub name: String,
    pub is_source: bool,
    pub is_sink: bool,
    pub udf: Option<Udf>,
    pub phase: String,
    /// `spec.replicas`; unset means one.
    pub desired_replicas: Option<i32>,
    pub replicas: u32,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexKind {
    #[serde(rename = "source")]
    Source,
    #[serde(rename = "sink")]
    Sink,
    #[serde(rename = "udf (map)")]
    MapUdf,
    #[serde(rename = "udf (reduce)")]
    ReduceUdf,
}

impl VertexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VertexKind::Source => "source",
            VertexKind::Sink => "sink",
            VertexKind::MapUdf => "udf (map)",
            VertexKind::ReduceUdf => "udf (reduce)",
        }
    }
}

impl Vertex {
    /// Source wins over sink, sink over UDF. `None` when no role section is set.
    pub fn kind(&self) -> Option<VertexKind> {
        if self.is_source {
            Some(VertexKind::Source)
        } else if self.is_sink {
            Some(VertexKind::Sink)
        } else {
            self.udf.map(|u| match u {
                Udf::Map => VertexKind::MapUdf,
                Udf::Reduce => VertexKind::ReduceUdf,
            })
        }
    }

    pub fn desired_replicas_or_default(&self) -> i32 {
        self.desired_replicas.unwrap_or(1)
    }

    pub fn health(&self) -> Health {
        Health::from_phase(&self.phase)
    }
}

/// Which backing spec an inter-step-buffer service populates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsbsvcBacking {
    /// `Some(external)` when a redis section exists.
    pub redis: Option<bool>,
    pub jetstream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsbsvcType {
    #[serde(rename = "redis (external)")]
    RedisExternal,
    #[serde(rename = "redis (internal)")]
    RedisInternal,
    #[serde(rename = "jetstream")]
    JetStream,
}

impl IsbsvcType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsbsvcType::RedisExternal => "redis (external)",
            IsbsvcType::RedisInternal => "redis (internal)",
            IsbsvcType::JetStream => "jetstream",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterStepBufferService {
    pub namespace: String,
    pub name: String,
    pub backing: IsbsvcBacking,
    pub phase: String,
    pub created: Option<DateTime<Utc>>,
}

impl InterStepBufferService {
    pub fn backing_type(&self) -> Option<IsbsvcType> {
        match (self.backing.redis, self.backing.jetstream) {
            (Some(true), _) => Some(IsbsvcType::RedisExternal),
            (Some(false), _) => Some(IsbsvcType::RedisInternal),
            (None, true) => Some(IsbsvcType::JetStream),
            (None, false) => None,
        }
    }
}

/// Buffer between two vertices as reported by the pipeline daemon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edge {
    pub buffer_name: Option<String>,
    pub from_vertex: Option<String>,
    pub to_vertex: Option<String>,
    pub pending_count: Option<i64>,
    pub ack_pending_count: Option<i64>,
    /// Percentage of the buffer in use.
    pub buffer_usage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexMetricSample {
    pub processing_rates: HashMap<String, f64>,
    pub pendings: HashMap<String, i64>,
}

/// Head watermark of a vertex, epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub watermark: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerUsage {
    pub cpu_milli: i64,
    pub memory_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodMetrics {
    pub containers: Vec<ContainerUsage>,
}

/// Health arc bucket for a vertex phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Success,
    Failure,
    Neutral,
}

impl Health {
    pub fn from_phase(phase: &str) -> Self {
        match phase {
            "Failed" => Health::Failure,
            "Running" | "Succeeded" => Health::Success,
            _ => Health::Neutral,
        }
    }

    /// Arc weights as `(success, failure, neutral)`; exactly one is 1.
    pub fn arcs(&self) -> (f32, f32, f32) {
        match self {
            Health::Success => (1.0, 0.0, 0.0),
            Health::Failure => (0.0, 1.0, 0.0),
            Health::Neutral => (0.0, 0.0, 1.0),
        }
    }
}

/// UTC timestamp with millisecond precision, e.g. `2023-01-02T03:04:05.678Z`.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn format_creation(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub fn parse_creation(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

pub mod prelude {
    pub use super::{
        ContainerUsage, Edge, Health, InterStepBufferService, IsbsvcType, LensError, LensResult,
        Pipeline, Pod, PodMetrics, ResourceKind, Vertex, VertexKind, VertexMetricSample, Watermark,
        ALL_NAMESPACES, WILDCARD,
    };
}
