//! Projection of raw Kubernetes JSON into snapshot entities.

use numalens_core::{
    parse_creation, ContainerUsage, InterStepBufferService, IsbsvcBacking, LensError, LensResult,
    Pipeline, PodMetrics, Udf, Vertex,
};
use serde_json::Value;

pub const LABEL_PIPELINE_NAME: &str = "numaflow.numaproj.io/pipeline-name";
pub const LABEL_VERTEX_NAME: &str = "numaflow.numaproj.io/vertex-name";

fn str_at(raw: &Value, path: &str) -> String {
    raw.pointer(path).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

fn u32_at(raw: &Value, path: &str) -> Option<u32> {
    raw.pointer(path).and_then(|v| v.as_u64()).map(|n| n as u32)
}

fn present(raw: &Value, path: &str) -> bool {
    raw.pointer(path).is_some_and(|v| !v.is_null())
}

fn label(raw: &Value, key: &str) -> Option<String> {
    raw.get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn created(raw: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.pointer("/metadata/creationTimestamp").and_then(|v| v.as_str()).and_then(parse_creation)
}

pub fn pipeline_from_json(raw: &Value) -> Pipeline {
    Pipeline {
        namespace: str_at(raw, "/metadata/namespace"),
        name: str_at(raw, "/metadata/name"),
        phase: str_at(raw, "/status/phase"),
        vertex_count: u32_at(raw, "/status/vertexCount"),
        source_count: u32_at(raw, "/status/sourceCount"),
        sink_count: u32_at(raw, "/status/sinkCount"),
        udf_count: u32_at(raw, "/status/udfCount"),
        created: created(raw),
    }
}

pub fn vertex_from_json(raw: &Value) -> Vertex {
    let mut pipeline = str_at(raw, "/spec/pipelineName");
    if pipeline.is_empty() {
        pipeline = label(raw, LABEL_PIPELINE_NAME).unwrap_or_default();
    }
    let mut name = str_at(raw, "/spec/name");
    if name.is_empty() {
        name = label(raw, LABEL_VERTEX_NAME).unwrap_or_default();
    }
    let udf = if present(raw, "/spec/udf") {
        Some(if present(raw, "/spec/udf/groupBy") { Udf::Reduce } else { Udf::Map })
    } else {
        None
    };
    Vertex {
        namespace: str_at(raw, "/metadata/namespace"),
        pipeline,
        name,
        is_source: present(raw, "/spec/source"),
        is_sink: present(raw, "/spec/sink"),
        udf,
        phase: str_at(raw, "/status/phase"),
        desired_replicas: raw.pointer("/spec/replicas").and_then(|v| v.as_i64()).map(|n| n as i32),
        replicas: u32_at(raw, "/status/replicas").unwrap_or(0),
        created: created(raw),
    }
}

pub fn isbsvc_from_json(raw: &Value) -> InterStepBufferService {
    let redis = if present(raw, "/spec/redis") { Some(present(raw, "/spec/redis/external")) } else { None };
    InterStepBufferService {
        namespace: str_at(raw, "/metadata/namespace"),
        name: str_at(raw, "/metadata/name"),
        backing: IsbsvcBacking { redis, jetstream: present(raw, "/spec/jetstream") },
        phase: str_at(raw, "/status/phase"),
        created: created(raw),
    }
}

/// Parse a `metrics.k8s.io` PodMetrics object.
pub fn pod_metrics_from_json(raw: &Value) -> LensResult<PodMetrics> {
    let mut containers = Vec::new();
    let Some(list) = raw.get("containers").and_then(|v| v.as_array()) else {
        return Ok(PodMetrics { containers });
    };
    for c in list {
        let cpu = c.pointer("/usage/cpu").and_then(|v| v.as_str()).unwrap_or("0");
        let memory = c.pointer("/usage/memory").and_then(|v| v.as_str()).unwrap_or("0");
        let cpu_milli = parse_quantity_scaled(cpu, -3)
            .ok_or_else(|| LensError::Upstream(format!("invalid cpu quantity {:?}", cpu)))?;
        let memory_bytes = parse_quantity_scaled(memory, 0)
            .ok_or_else(|| LensError::Upstream(format!("invalid memory quantity {:?}", memory)))?;
        containers.push(ContainerUsage { cpu_milli, memory_bytes });
    }
    Ok(PodMetrics { containers })
}

/// Parse a Kubernetes resource quantity (`250m`, `64Mi`, `1.5e3`) and return it in
/// units of `10^scale`, rounded up. Integer arithmetic only, so `3m` at scale -3 is exactly 3.
pub fn parse_quantity_scaled(s: &str, scale: i32) -> Option<i64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(s.len());
    let (num, suffix) = s.split_at(split);
    let (negative, digits) = match num.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, num.strip_prefix('+').unwrap_or(num)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let mut mantissa: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let d = c.to_digit(10)? as i128;
        mantissa = mantissa.checked_mul(10)?.checked_add(d)?;
    }
    let (exp10, binary_pow) = match suffix {
        "" => (0, 0),
        "n" => (-9, 0),
        "u" => (-6, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        "Ki" => (0, 1),
        "Mi" => (0, 2),
        "Gi" => (0, 3),
        "Ti" => (0, 4),
        "Pi" => (0, 5),
        "Ei" => (0, 6),
        exp if exp.starts_with('e') || exp.starts_with('E') => (exp[1..].parse::<i32>().ok()?, 0),
        _ => return None,
    };
    let mut value = mantissa.checked_mul(1024i128.checked_pow(binary_pow)?)?;
    let shift = exp10 - frac_part.len() as i32 - scale;
    if shift >= 0 {
        value = value.checked_mul(10i128.checked_pow(shift as u32)?)?;
    } else {
        let div = 10i128.checked_pow(shift.unsigned_abs())?;
        value = (value + div - 1) / div;
    }
    let value = if negative { -value } else { value };
    i64::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity_scaled("250m", -3), Some(250));
        assert_eq!(parse_quantity_scaled("3m", -3), Some(3));
        assert_eq!(parse_quantity_scaled("2", -3), Some(2000));
        assert_eq!(parse_quantity_scaled("0.1", -3), Some(100));
        assert_eq!(parse_quantity_scaled("12500000n", -3), Some(13));
        assert_eq!(parse_quantity_scaled("64Mi", 0), Some(67_108_864));
        assert_eq!(parse_quantity_scaled("1.5Gi", 0), Some(1_610_612_736));
        assert_eq!(parse_quantity_scaled("1k", 0), Some(1000));
        assert_eq!(parse_quantity_scaled("1e3", 0), Some(1000));
        assert_eq!(parse_quantity_scaled("20Mi", 6), Some(21));
        assert!(parse_quantity_scaled("", 0).is_none());
        assert!(parse_quantity_scaled("12Q", 0).is_none());
        assert!(parse_quantity_scaled("m", 0).is_none());
    }

    #[test]
    fn pipeline_projection() {
        let raw = json!({
            "metadata": { "name": "simple", "namespace": "ns", "creationTimestamp": "2023-01-01T00:00:00Z" },
            "status": { "phase": "Running", "vertexCount": 3, "sourceCount": 1, "sinkCount": 1, "udfCount": 1 }
        });
        let p = pipeline_from_json(&raw);
        assert_eq!(p.name, "simple");
        assert_eq!(p.namespace, "ns");
        assert_eq!(p.phase, "Running");
        assert_eq!(p.vertex_count, Some(3));
        assert!(p.created.is_some());
    }

    #[test]
    fn vertex_projection_reads_roles_and_falls_back_to_labels() {
        let raw = json!({
            "metadata": {
                "name": "simple-cat",
                "namespace": "ns",
                "labels": { "numaflow.numaproj.io/pipeline-name": "simple", "numaflow.numaproj.io/vertex-name": "cat" }
            },
            "spec": { "udf": { "groupBy": { "window": {} } }, "replicas": 2 },
            "status": { "phase": "Pending", "replicas": 1 }
        });
        let v = vertex_from_json(&raw);
        assert_eq!(v.pipeline, "simple");
        assert_eq!(v.name, "cat");
        assert_eq!(v.udf, Some(Udf::Reduce));
        assert!(!v.is_source && !v.is_sink);
        assert_eq!(v.desired_replicas, Some(2));
        assert_eq!(v.replicas, 1);

        let raw = json!({ "metadata": { "namespace": "ns" }, "spec": { "name": "in", "pipelineName": "p", "source": {} } });
        let v = vertex_from_json(&raw);
        assert!(v.is_source);
        assert_eq!(v.desired_replicas, None);
    }

    #[test]
    fn isbsvc_projection() {
        let raw = json!({ "metadata": { "name": "default", "namespace": "ns" }, "spec": { "redis": { "external": { "url": "x" } } } });
        assert_eq!(isbsvc_from_json(&raw).backing, IsbsvcBacking { redis: Some(true), jetstream: false });
        let raw = json!({ "metadata": { "name": "default" }, "spec": { "jetstream": { "version": "latest" } } });
        assert_eq!(isbsvc_from_json(&raw).backing, IsbsvcBacking { redis: None, jetstream: true });
    }

    #[test]
    fn pod_metrics_projection() {
        let raw = json!({
            "containers": [
                { "name": "main", "usage": { "cpu": "12500000n", "memory": "20Mi" } },
                { "name": "sidecar", "usage": { "cpu": "3m", "memory": "1000k" } }
            ]
        });
        let m = pod_metrics_from_json(&raw).expect("ok");
        assert_eq!(m.containers[0], ContainerUsage { cpu_milli: 13, memory_bytes: 20_971_520 });
        assert_eq!(m.containers[1], ContainerUsage { cpu_milli: 3, memory_bytes: 1_000_000 });
        let bad = json!({ "containers": [ { "usage": { "cpu": "lots" } } ] });
        assert!(pod_metrics_from_json(&bad).is_err());
    }
}
