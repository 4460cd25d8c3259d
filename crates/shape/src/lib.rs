//! Numalens shaping.
//!
//! Turns a [`numalens_query::ResolvedQuery`] into a [`Table`] or a [`NodeGraph`],
//! reading resources through [`numalens_kubehub::ResourceStore`] and runtime
//! metrics through [`numalens_kubehub::ControlPlane`]. Metric enrichment is
//! best-effort and lives in [`enrich`].

#![forbid(unsafe_code)]

pub mod dispatch;
pub mod enrich;
pub mod graph;
pub mod names;
pub mod table;

pub use dispatch::{query_types, shape, Output, OutputKind, QueryTypes};
pub use enrich::{PodUsage, Unavailable};
pub use graph::{build_graph, EdgeRow, NodeGraph, NodeRow};
pub use names::{metric_names, MetricNames};
pub use table::{build_table, IsbsvcRow, NamespaceRow, PipelineRow, Table, VertexRow};
