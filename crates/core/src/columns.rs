//! Column sets for tabular output.
//!
//! Each table kind has a stable, ordered list of columns. Labels double as the
//! field names of the JSON rows, so the two must stay in sync with the row types
//! in the shaping crate.

#![forbid(unsafe_code)]

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    Namespaces,
    Pipelines,
    Vertices,
    Isbsvcs,
}

impl TableKind {
    /// Frame name used by the datasource for this table.
    pub fn frame_name(&self) -> &'static str {
        match self {
            TableKind::Namespaces => "namespaces",
            TableKind::Pipelines => "pipelines",
            TableKind::Vertices => "vertices",
            TableKind::Isbsvcs => "isbsvcs",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub label: &'static str,
}

fn col(label: &'static str) -> ColumnSpec {
    ColumnSpec { label }
}

pub fn columns_for(kind: TableKind) -> Vec<ColumnSpec> {
    let mut cols = vec![col("namespace")];
    match kind {
        TableKind::Namespaces => return cols,
        TableKind::Pipelines => {
            cols.push(col("name"));
            cols.push(col("phase"));
            cols.push(col("vertices"));
            cols.push(col("sources"));
            cols.push(col("sinks"));
            cols.push(col("UDFs"));
        }
        TableKind::Vertices => {
            cols.push(col("pipeline"));
            cols.push(col("name"));
            cols.push(col("type"));
            cols.push(col("phase"));
            cols.push(col("replicas"));
            cols.push(col("desired replicas"));
            cols.push(col("processing rate"));
            cols.push(col("pending messages"));
            cols.push(col("watermark"));
            cols.push(col("cpu usage"));
            cols.push(col("memory usage"));
        }
        TableKind::Isbsvcs => {
            cols.push(col("name"));
            cols.push(col("type"));
            cols.push(col("phase"));
        }
    }
    cols.push(col("creation time"));
    cols
}
