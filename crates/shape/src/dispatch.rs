//! Routes a resolved query to the table or node-graph shaper.

use std::str::FromStr;

use numalens_core::{LensError, LensResult};
use numalens_kubehub::{ControlPlane, RequestCtx, ResourceStore};
use numalens_query::ResolvedQuery;
use serde::{Deserialize, Serialize};

use crate::graph::{build_graph, NodeGraph};
use crate::table::{build_table, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    Table,
    NodeGraph,
}

impl OutputKind {
    pub const ALL: [OutputKind; 2] = [OutputKind::Table, OutputKind::NodeGraph];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Table => "Table",
            OutputKind::NodeGraph => "NodeGraph",
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKind {
    type Err = LensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| LensError::Validation(format!("unsupported output kind: {:?}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Table(Table),
    NodeGraph(NodeGraph),
}

/// `{"queryTypes": ["Table", "NodeGraph"]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryTypes {
    #[serde(rename = "queryTypes")]
    pub query_types: Vec<&'static str>,
}

pub fn query_types() -> QueryTypes {
    QueryTypes { query_types: OutputKind::ALL.iter().map(|k| k.as_str()).collect() }
}

pub async fn shape(
    ctx: &RequestCtx,
    q: &ResolvedQuery,
    kind: OutputKind,
    store: &dyn ResourceStore,
    cp: &dyn ControlPlane,
) -> LensResult<Output> {
    match kind {
        OutputKind::Table => build_table(ctx, q, store, cp).await.map(Output::Table),
        OutputKind::NodeGraph => build_graph(ctx, q, store, cp).await.map(Output::NodeGraph),
    }
}
