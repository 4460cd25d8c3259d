//! Numalens query model.
//!
//! A datasource query arrives as an envelope whose `rawQuery` field holds a small
//! JSON document naming the resources to show:
//!
//! ```text
//! all pipelines, all namespaces    {"pipeline":"*"}
//! all vertices of some pipelines   {"namespace":"ns","pipeline":"{a,b}","vertex":"*"}
//! a single vertex                  {"namespace":"ns","pipeline":"my-pl","vertex":"in"}
//! namespaces holding isbsvcs       {"namespace":"*","isbsvc":""}
//! ```
//!
//! Parsing resolves that document into an immutable [`ResolvedQuery`].

#![forbid(unsafe_code)]

use numalens_core::{LensError, LensResult, ResourceKind, ALL_NAMESPACES, WILDCARD};
use serde::Deserialize;
use tracing::debug;

mod settings;

pub use settings::Settings;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "rawQuery")]
    raw_query: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawQuery {
    namespace: Option<String>,
    pipeline: Option<String>,
    vertex: Option<String>,
    isbsvc: Option<String>,
}

/// The single leaf resource a query targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Pipeline { name: String },
    /// `pipeline` is a filter: empty or `*` means every pipeline.
    Vertex { pipeline: String, name: String },
    Isbsvc { name: String },
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Pipeline { .. } => ResourceKind::Pipeline,
            Resource::Vertex { .. } => ResourceKind::Vertex,
            Resource::Isbsvc { .. } => ResourceKind::Isbsvc,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Pipeline { name } | Resource::Vertex { name, .. } | Resource::Isbsvc { name } => name,
        }
    }
}

/// Validated, canonical form of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    namespace: String,
    resource: Resource,
}

/// True when the filter holds several comma-separated names.
pub fn is_multi_filter(field: &str) -> bool {
    field.contains(',')
}

/// Names held by a filter; `{a,b}` and `a,b` both expand to `[a, b]`.
pub fn expand_filter(field: &str) -> Vec<String> {
    if !is_multi_filter(field) {
        return vec![field.to_string()];
    }
    let inner = field.strip_prefix('{').unwrap_or(field);
    let inner = inner.strip_suffix('}').unwrap_or(inner);
    inner
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Absent, empty and `*` namespaces all mean every namespace.
pub fn is_all_namespaces(namespace: &str) -> bool {
    namespace == ALL_NAMESPACES || namespace == WILDCARD
}

fn invalid(msg: &str) -> LensError {
    LensError::Validation(msg.to_string())
}

/// Parse a query envelope (`{"rawQuery": "..."}`).
pub fn parse(bytes: &[u8], settings: &Settings) -> LensResult<ResolvedQuery> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| LensError::Validation(format!("invalid query envelope: {}", e)))?;
    parse_raw_query(&envelope.raw_query, settings)
}

/// Parse the raw query document itself.
pub fn parse_raw_query(raw: &str, settings: &Settings) -> LensResult<ResolvedQuery> {
    let raw: RawQuery = serde_json::from_str(raw)
        .map_err(|e| LensError::Validation(format!("invalid raw query: {}", e)))?;
    let resource = match (raw.pipeline, raw.vertex, raw.isbsvc) {
        (None, None, None) | (Some(_), _, Some(_)) | (_, Some(_), Some(_)) => {
            return Err(invalid("must specify exactly one of pipeline, vertex, isbsvc"));
        }
        (pipeline, Some(name), None) => Resource::Vertex { pipeline: pipeline.unwrap_or_default(), name },
        (Some(name), None, None) => Resource::Pipeline { name },
        (None, None, Some(name)) => Resource::Isbsvc { name },
    };
    let namespace = match settings.pinned_namespace() {
        Some(pinned) => pinned.to_string(),
        None => raw.namespace.unwrap_or_else(|| ALL_NAMESPACES.to_string()),
    };
    let q = ResolvedQuery { namespace, resource };
    q.validate()?;
    debug!(kind = %q.kind(), name = %q.resource_name(), namespace = %q.namespace, "query resolved");
    Ok(q)
}

impl ResolvedQuery {
    fn validate(&self) -> LensResult<()> {
        match self.resource.name() {
            WILDCARD => Ok(()),
            "" if is_all_namespaces(&self.namespace) => Ok(()),
            "" => Err(invalid("resource name may only be empty when listing namespaces across all namespaces")),
            _ if is_all_namespaces(&self.namespace) => Err(invalid(
                "namespace must be provided when requesting a single pipeline, vertex, or isbsvc by name",
            )),
            _ if is_multi_filter(&self.namespace) => Err(invalid(
                "a single namespace must be provided when requesting a single pipeline, vertex, or isbsvc by name",
            )),
            _ => match &self.resource {
                Resource::Vertex { pipeline, .. }
                    if pipeline.is_empty() || pipeline == WILDCARD || is_multi_filter(pipeline) =>
                {
                    Err(invalid("pipeline must be provided when requesting a single vertex by name"))
                }
                _ => Ok(()),
            },
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn resource_name(&self) -> &str {
        self.resource.name()
    }

    /// Pipeline filter of a vertex query.
    pub fn pipeline_filter(&self) -> Option<&str> {
        match &self.resource {
            Resource::Vertex { pipeline, .. } => Some(pipeline),
            _ => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.resource_name() == WILDCARD
    }

    /// Empty name: the query asks which namespaces hold this kind.
    pub fn lists_namespaces(&self) -> bool {
        self.resource_name().is_empty()
    }

    pub fn is_multi_namespace(&self) -> bool {
        is_multi_filter(&self.namespace)
    }

    /// Scope to list with. Multi-valued filters list broadly and are narrowed afterwards.
    pub fn effective_namespace(&self) -> &str {
        if self.is_multi_namespace() || is_all_namespaces(&self.namespace) {
            ALL_NAMESPACES
        } else {
            &self.namespace
        }
    }

    pub fn namespace_filter(&self) -> Vec<String> {
        expand_filter(&self.namespace)
    }

    pub fn matches_namespace(&self, namespace: &str) -> bool {
        is_all_namespaces(&self.namespace) || self.namespace_filter().iter().any(|n| n == namespace)
    }

    pub fn matches_pipeline(&self, pipeline: &str) -> bool {
        match self.pipeline_filter() {
            None => true,
            Some(f) if f.is_empty() || f == WILDCARD => true,
            Some(f) => expand_filter(f).iter().any(|p| p == pipeline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(raw: &str) -> LensResult<ResolvedQuery> {
        parse_raw_query(raw, &Settings::default())
    }

    fn validation_msg(r: LensResult<ResolvedQuery>) -> String {
        match r {
            Err(LensError::Validation(m)) => m,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn parses_envelope() {
        let body = br#"{"refId":"A","rawQuery":"{\"namespace\":\"ns\",\"pipeline\":\"*\"}"}"#;
        let q = parse(body, &Settings::default()).expect("valid");
        assert_eq!(q.kind(), ResourceKind::Pipeline);
        assert_eq!(q.namespace(), "ns");
        assert!(q.is_wildcard());
    }

    #[test]
    fn envelope_without_raw_query_is_invalid() {
        let e = parse(br#"{"refId":"A"}"#, &Settings::default()).unwrap_err();
        assert!(matches!(e, LensError::Validation(_)));
        let e = parse(br#"{"rawQuery":"not json"}"#, &Settings::default()).unwrap_err();
        assert!(matches!(e, LensError::Validation(_)));
    }

    #[test]
    fn rejects_no_resource() {
        let m = validation_msg(resolve(r#"{"namespace":"ns"}"#));
        assert!(m.contains("exactly one of pipeline, vertex, isbsvc"), "m={}", m);
    }

    #[test]
    fn rejects_more_than_one_resource() {
        for raw in [
            r#"{"namespace":"ns","pipeline":"*","isbsvc":"*"}"#,
            r#"{"namespace":"ns","vertex":"*","isbsvc":"*"}"#,
            r#"{"namespace":"ns","pipeline":"a","vertex":"b","isbsvc":"c"}"#,
        ] {
            let m = validation_msg(resolve(raw));
            assert!(m.contains("exactly one"), "raw={} m={}", raw, m);
        }
    }

    #[test]
    fn vertex_wins_over_pipeline() {
        let q = resolve(r#"{"namespace":"ns","pipeline":"my-pl","vertex":"in"}"#).expect("valid");
        assert_eq!(q.kind(), ResourceKind::Vertex);
        assert_eq!(q.resource_name(), "in");
        assert_eq!(q.pipeline_filter(), Some("my-pl"));
    }

    #[test]
    fn wildcard_vertex_without_pipeline_spans_all_pipelines() {
        let q = resolve(r#"{"namespace":"ns","vertex":"*"}"#).expect("valid");
        assert_eq!(q.resource(), &Resource::Vertex { pipeline: String::new(), name: "*".into() });
        assert!(q.matches_pipeline("anything"));
    }

    #[test]
    fn named_vertex_requires_pipeline() {
        let m = validation_msg(resolve(r#"{"namespace":"ns","vertex":"v1"}"#));
        assert!(m.contains("pipeline must be provided"), "m={}", m);
        let m = validation_msg(resolve(r#"{"namespace":"ns","pipeline":"{a,b}","vertex":"v1"}"#));
        assert!(m.contains("pipeline must be provided"), "m={}", m);
    }

    #[test]
    fn wildcard_pipeline_defaults_to_all_namespaces() {
        let q = resolve(r#"{"pipeline":"*"}"#).expect("valid");
        assert_eq!(q.kind(), ResourceKind::Pipeline);
        assert_eq!(q.resource_name(), "*");
        assert_eq!(q.namespace(), ALL_NAMESPACES);
        assert_eq!(q.effective_namespace(), ALL_NAMESPACES);
        assert!(q.matches_namespace("any-ns"));
    }

    #[test]
    fn named_pipeline_requires_namespace() {
        let m = validation_msg(resolve(r#"{"pipeline":"my-pl"}"#));
        assert!(m.contains("namespace must be provided"), "m={}", m);
        let m = validation_msg(resolve(r#"{"namespace":"*","pipeline":"my-pl"}"#));
        assert!(m.contains("namespace must be provided"), "m={}", m);
        let m = validation_msg(resolve(r#"{"namespace":"{a,b}","isbsvc":"default"}"#));
        assert!(m.contains("single namespace"), "m={}", m);
    }

    #[test]
    fn multi_namespace_filter() {
        let q = resolve(r#"{"namespace":"{ns1,ns2}","pipeline":"*"}"#).expect("valid");
        assert!(q.is_multi_namespace());
        assert_eq!(q.namespace_filter(), vec!["ns1".to_string(), "ns2".to_string()]);
        assert_eq!(q.effective_namespace(), ALL_NAMESPACES);
        assert!(q.matches_namespace("ns2"));
        assert!(!q.matches_namespace("ns3"));
    }

    #[test]
    fn empty_name_lists_namespaces_only_across_all_namespaces() {
        let q = resolve(r#"{"namespace":"*","isbsvc":""}"#).expect("valid");
        assert!(q.lists_namespaces());
        assert_eq!(q.kind(), ResourceKind::Isbsvc);
        let q = resolve(r#"{"pipeline":"","vertex":""}"#).expect("valid");
        assert_eq!(q.kind(), ResourceKind::Vertex);
        let m = validation_msg(resolve(r#"{"namespace":"ns","pipeline":""}"#));
        assert!(m.contains("may only be empty"), "m={}", m);
    }

    #[test]
    fn pinned_namespace_overrides_query() {
        let s = Settings::pinned("team-a");
        let q = parse_raw_query(r#"{"namespace":"other","pipeline":"my-pl"}"#, &s).expect("valid");
        assert_eq!(q.namespace(), "team-a");
        // pinning also satisfies the concrete-namespace rule
        let q = parse_raw_query(r#"{"pipeline":"my-pl"}"#, &s).expect("valid");
        assert_eq!(q.effective_namespace(), "team-a");
    }

    #[test]
    fn expand_filter_shapes() {
        assert_eq!(expand_filter("a"), vec!["a"]);
        assert_eq!(expand_filter("{a,b,c}"), vec!["a", "b", "c"]);
        assert_eq!(expand_filter("a,b"), vec!["a", "b"]);
        assert_eq!(expand_filter("{a, b,}"), vec!["a", "b"]);
        assert!(!is_multi_filter("{a}"));
        assert!(is_multi_filter("{a,b}"));
    }

    #[test]
    fn pipeline_filter_set_matches_members_only() {
        let q = resolve(r#"{"namespace":"ns","pipeline":"{p1,p2}","vertex":"*"}"#).expect("valid");
        assert!(q.matches_pipeline("p1"));
        assert!(!q.matches_pipeline("p3"));
    }
}
