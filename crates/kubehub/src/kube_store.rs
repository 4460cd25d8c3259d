//! Resource store backed by the Kubernetes API.

use std::future::Future;

use anyhow::Context;
use k8s_openapi::api::core::v1::Pod as KubePod;
use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use numalens_core::{InterStepBufferService, LensError, LensResult, Pipeline, Pod, PodMetrics, Vertex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::convert::{
    isbsvc_from_json, pipeline_from_json, pod_metrics_from_json, vertex_from_json, LABEL_PIPELINE_NAME,
    LABEL_VERTEX_NAME,
};
use crate::{RequestCtx, ResourceStore};

const NUMAFLOW_GROUP: &str = "numaflow.numaproj.io";
const NUMAFLOW_VERSION: &str = "v1alpha1";

/// [`ResourceStore`] over Numaflow CRDs, core pods and `metrics.k8s.io`.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

fn all_namespaces(scope: &str) -> bool {
    scope.is_empty() || scope == "*"
}

fn map_kube_err(what: &str, e: kube::Error) -> LensError {
    match &e {
        kube::Error::Api(ae) if ae.code == 404 => LensError::NotFound(format!("{}: {}", what, ae.message)),
        _ => LensError::Upstream(format!("{}: {}", what, e)),
    }
}

/// Await a kube call, bounded by the request deadline when one is set.
async fn within<T, F>(ctx: &RequestCtx, what: &str, fut: F) -> LensResult<T>
where
    F: Future<Output = Result<T, kube::Error>>,
{
    let res = match ctx.remaining() {
        Some(left) => tokio::time::timeout(left, fut)
            .await
            .map_err(|_| LensError::Upstream(format!("{}: deadline exceeded", what)))?,
        None => fut.await,
    };
    res.map_err(|e| {
        let err = map_kube_err(what, e);
        if matches!(err, LensError::Upstream(_)) {
            warn!(error = %err, "kube call failed");
        }
        err
    })
}

fn to_json(obj: &DynamicObject) -> LensResult<Value> {
    serde_json::to_value(obj).map_err(|e| LensError::Internal(format!("serializing object: {}", e)))
}

fn selector(pipeline: &str, vertex: Option<&str>) -> String {
    match vertex {
        Some(v) => format!("{}={},{}={}", LABEL_PIPELINE_NAME, pipeline, LABEL_VERTEX_NAME, v),
        None => format!("{}={}", LABEL_PIPELINE_NAME, pipeline),
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the ambient kubeconfig or in-cluster configuration.
    pub async fn try_default() -> anyhow::Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Ok(Self { client })
    }

    fn dynamic_api(&self, scope: &str, gvk: &GroupVersionKind, plural: &str) -> Api<DynamicObject> {
        let ar = ApiResource::from_gvk_with_plural(gvk, plural);
        if all_namespaces(scope) {
            Api::all_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), scope, &ar)
        }
    }

    fn numaflow_api(&self, scope: &str, kind: &str, plural: &str) -> Api<DynamicObject> {
        self.dynamic_api(scope, &GroupVersionKind::gvk(NUMAFLOW_GROUP, NUMAFLOW_VERSION, kind), plural)
    }

    async fn list_objects(
        &self,
        ctx: &RequestCtx,
        api: Api<DynamicObject>,
        lp: ListParams,
        what: &str,
    ) -> LensResult<Vec<Value>> {
        let list = within(ctx, what, api.list(&lp)).await?;
        debug!(what, count = list.items.len(), "listed objects");
        list.items.iter().map(to_json).collect()
    }
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn list_pipelines(&self, ctx: &RequestCtx, scope: &str) -> LensResult<Vec<Pipeline>> {
        let api = self.numaflow_api(scope, "Pipeline", "pipelines");
        let items = self.list_objects(ctx, api, ListParams::default(), "list pipelines").await?;
        Ok(items.iter().map(pipeline_from_json).collect())
    }

    async fn get_pipeline(&self, ctx: &RequestCtx, namespace: &str, name: &str) -> LensResult<Pipeline> {
        let api = self.numaflow_api(namespace, "Pipeline", "pipelines");
        let obj = within(ctx, "get pipeline", api.get(name)).await?;
        Ok(pipeline_from_json(&to_json(&obj)?))
    }

    async fn list_vertices(&self, ctx: &RequestCtx, scope: &str) -> LensResult<Vec<Vertex>> {
        let api = self.numaflow_api(scope, "Vertex", "vertices");
        let items = self.list_objects(ctx, api, ListParams::default(), "list vertices").await?;
        Ok(items.iter().map(vertex_from_json).collect())
    }

    async fn list_pipeline_vertices(&self, ctx: &RequestCtx, scope: &str, pipeline: &str) -> LensResult<Vec<Vertex>> {
        let api = self.numaflow_api(scope, "Vertex", "vertices");
        let lp = ListParams::default().labels(&selector(pipeline, None));
        let items = self.list_objects(ctx, api, lp, "list pipeline vertices").await?;
        Ok(items.iter().map(vertex_from_json).collect())
    }

    async fn get_vertex(&self, ctx: &RequestCtx, namespace: &str, pipeline: &str, name: &str) -> LensResult<Vertex> {
        let api = self.numaflow_api(namespace, "Vertex", "vertices");
        let lp = ListParams::default().labels(&selector(pipeline, Some(name)));
        let items = self.list_objects(ctx, api, lp, "get vertex").await?;
        items
            .first()
            .map(vertex_from_json)
            .ok_or_else(|| LensError::NotFound(format!("vertex {:?} not found in pipeline {:?}", name, pipeline)))
    }

    async fn list_isbsvcs(&self, ctx: &RequestCtx, scope: &str) -> LensResult<Vec<InterStepBufferService>> {
        let api = self.numaflow_api(scope, "InterStepBufferService", "interstepbufferservices");
        let items = self.list_objects(ctx, api, ListParams::default(), "list isbsvcs").await?;
        Ok(items.iter().map(isbsvc_from_json).collect())
    }

    async fn get_isbsvc(&self, ctx: &RequestCtx, namespace: &str, name: &str) -> LensResult<InterStepBufferService> {
        let api = self.numaflow_api(namespace, "InterStepBufferService", "interstepbufferservices");
        let obj = within(ctx, "get isbsvc", api.get(name)).await?;
        Ok(isbsvc_from_json(&to_json(&obj)?))
    }

    async fn list_vertex_pods(&self, ctx: &RequestCtx, namespace: &str, pipeline: &str, vertex: &str) -> LensResult<Vec<Pod>> {
        let api: Api<KubePod> = if all_namespaces(namespace) {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        };
        let lp = ListParams::default().labels(&selector(pipeline, Some(vertex)));
        let list = within(ctx, "list vertex pods", api.list(&lp)).await?;
        Ok(list
            .items
            .into_iter()
            .map(|p| Pod {
                namespace: p.metadata.namespace.unwrap_or_default(),
                name: p.metadata.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn get_pod_metrics(&self, ctx: &RequestCtx, namespace: &str, pod: &str) -> LensResult<PodMetrics> {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        let api = self.dynamic_api(namespace, &gvk, "pods");
        let obj = within(ctx, "get pod metrics", api.get(pod)).await?;
        pod_metrics_from_json(&to_json(&obj)?)
    }
}
