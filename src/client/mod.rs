//! Cluster access: discovery, bulk listing, single-object fetch, pod logs

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::TypeMeta;
use kube::discovery::{verbs, Discovery, Scope as ApiScope};
use kube::{Client, Config};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{KhError, Result};
use crate::object::{GroupKind, GroupKindMatcher, GroupResource, Object, Scope};

/// Page size for list calls. Pagination keeps single responses bounded on
/// large clusters.
const PAGE_SIZE: u32 = 250;

/// Upper bound on concurrent per-GVR list requests.
const LIST_CONCURRENCY: usize = 32;

/// Result of a bulk listing: whatever was loaded, plus the first error
/// encountered. Partial failure is the norm on live clusters.
pub struct ListOutcome {
    pub objects: Vec<Object>,
    pub error: Option<KhError>,
}

/// Typed facade over the cluster, narrow enough to be replaced by a fixture
/// store in tests.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List all objects of kinds selected by the matcher within the scope,
    /// skipping kinds in `excluded`.
    async fn list_with_matcher(
        &self,
        scope: &Scope,
        matcher: &GroupKindMatcher,
        excluded: &[GroupKind],
    ) -> ListOutcome;

    /// Fetch a single object.
    async fn get(&self, kind: &GroupKind, namespace: Option<&str>, name: &str) -> Result<Object>;

    /// Fetch the last `tail_lines` of a pod container's log.
    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail_lines: i64,
    ) -> Result<String>;

    /// Map a `(group, resource)` pair to the kind serving it.
    fn resource_to_kind(&self, resource: &GroupResource) -> Result<GroupKind>;

    /// Whether the given kind is namespaced.
    fn is_namespaced(&self, kind: &GroupKind) -> Result<bool>;
}

/// Options for connecting to a cluster.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Explicit kubeconfig path; `KUBECONFIG` and the default location are
    /// honored when unset.
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

/// One listable resource discovered on the server.
#[derive(Debug, Clone)]
struct DiscoveredResource {
    resource: ApiResource,
    kind: GroupKind,
}

/// Real cluster client backed by the dynamic API.
pub struct KubeClusterClient {
    client: Client,
    default_namespace: String,
    namespaced: Vec<DiscoveredResource>,
    cluster_scoped: Vec<DiscoveredResource>,
}

impl KubeClusterClient {
    /// Connect to the cluster and discover its REST surface.
    pub async fn connect(options: &ClientOptions) -> Result<Self> {
        let config = load_config(options).await?;
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).map_err(KhError::from)?;

        let mut namespaced = Vec::new();
        let mut cluster_scoped = Vec::new();

        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|e| KhError::Discovery(e.to_string()))?;

        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                debug!(group = %ar.group, version = %ar.version, api = %ar.plural,
                    namespaced = caps.scope == ApiScope::Namespaced, "discovered api");

                if !caps.supports_operation(verbs::LIST) {
                    debug!(api = %ar.plural, "api doesn't support list, skipping");
                    continue;
                }

                let entry = DiscoveredResource {
                    kind: GroupKind::new(ar.group.clone(), ar.kind.clone()),
                    resource: ar,
                };
                if caps.scope == ApiScope::Namespaced {
                    namespaced.push(entry);
                } else {
                    cluster_scoped.push(entry);
                }
            }
        }

        Ok(Self {
            client,
            default_namespace,
            namespaced,
            cluster_scoped,
        })
    }

    /// Namespace selected by the kubeconfig context.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Select the GVRs a matcher expands to within the scope.
    fn candidates(
        &self,
        scope: &Scope,
        matcher: &GroupKindMatcher,
        excluded: &[GroupKind],
    ) -> Vec<DiscoveredResource> {
        let mut ret = Vec::new();

        let keep =
            |res: &DiscoveredResource| matcher.matches(&res.kind) && !excluded.contains(&res.kind);

        if matches!(scope, Scope::Cluster | Scope::All) {
            ret.extend(self.cluster_scoped.iter().filter(|r| keep(r)).cloned());
        }
        if matches!(scope, Scope::Namespaced(_) | Scope::All) {
            ret.extend(self.namespaced.iter().filter(|r| keep(r)).cloned());
        }

        ret
    }

    fn dynamic_api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    /// List one resource with continue-token pagination.
    async fn list_paginated(
        &self,
        res: &DiscoveredResource,
        namespace: Option<&str>,
    ) -> Result<Vec<Object>> {
        let api = self.dynamic_api(&res.resource, namespace);
        let mut out = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let params = ListParams {
                limit: Some(PAGE_SIZE),
                continue_token: token.take(),
                ..Default::default()
            };
            let list = api.list(&params).await.map_err(|e| KhError::List {
                resource: res.resource.plural.clone(),
                source: e,
            })?;

            for item in list.items {
                out.push(dynamic_to_object(item, &res.resource)?);
            }

            token = list.metadata.continue_.filter(|t| !t.is_empty());
            if token.is_none() {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_with_matcher(
        &self,
        scope: &Scope,
        matcher: &GroupKindMatcher,
        excluded: &[GroupKind],
    ) -> ListOutcome {
        let resources = self.candidates(scope, matcher, excluded);
        if resources.is_empty() {
            return ListOutcome {
                objects: Vec::new(),
                error: None,
            };
        }

        debug!(count = resources.len(), "starting to query resources");

        let namespace = scope.namespace();
        let mut futures: Vec<
            std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Object>>> + Send + '_>>,
        > = Vec::with_capacity(resources.len());
        for res in resources.iter() {
            futures.push(Box::pin(self.list_paginated(res, namespace)));
        }
        let results: Vec<Result<Vec<Object>>> = stream::iter(futures)
            .buffer_unordered(LIST_CONCURRENCY)
            .collect()
            .await;

        let mut objects = Vec::new();
        let mut error = None;
        for result in results {
            match result {
                Ok(objs) => objects.extend(objs),
                // We only report one error; the other resources still count.
                Err(e) => {
                    if error.is_none() {
                        error = Some(e);
                    } else {
                        warn!(error = %e, "additional listing failure");
                    }
                }
            }
        }

        debug!(objects = objects.len(), failed = error.is_some(), "query results");
        ListOutcome { objects, error }
    }

    async fn get(&self, kind: &GroupKind, namespace: Option<&str>, name: &str) -> Result<Object> {
        let res = self
            .namespaced
            .iter()
            .chain(self.cluster_scoped.iter())
            .find(|r| &r.kind == kind)
            .ok_or_else(|| KhError::UnknownResource(kind.to_string()))?;

        let api = self.dynamic_api(&res.resource, namespace);
        let item = api.get(name).await.map_err(KhError::from)?;
        dynamic_to_object(item, &res.resource)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail_lines: i64,
    ) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            follow: false,
            previous: false,
            tail_lines: Some(tail_lines),
            ..Default::default()
        };
        api.logs(name, &params).await.map_err(KhError::from)
    }

    fn resource_to_kind(&self, resource: &GroupResource) -> Result<GroupKind> {
        self.namespaced
            .iter()
            .chain(self.cluster_scoped.iter())
            .find(|r| {
                r.resource.group == resource.group
                    && (r.resource.plural == resource.resource
                        || r.resource.kind.eq_ignore_ascii_case(&resource.resource))
            })
            .map(|r| r.kind.clone())
            .ok_or_else(|| KhError::UnknownResource(resource.to_string()))
    }

    fn is_namespaced(&self, kind: &GroupKind) -> Result<bool> {
        if self.namespaced.iter().any(|r| &r.kind == kind) {
            return Ok(true);
        }
        if self.cluster_scoped.iter().any(|r| &r.kind == kind) {
            return Ok(false);
        }
        Err(KhError::UnknownResource(kind.to_string()))
    }
}

async fn load_config(options: &ClientOptions) -> Result<Config> {
    let kube_options = KubeConfigOptions {
        context: options.context.clone(),
        ..Default::default()
    };

    if let Some(path) = &options.kubeconfig {
        let kubeconfig = Kubeconfig::read_from(path)
            .map_err(|e| KhError::Config(format!("Failed to read kubeconfig: {e}")))?;
        return Config::from_custom_kubeconfig(kubeconfig, &kube_options)
            .await
            .map_err(|e| KhError::Config(format!("Failed to load kubeconfig: {e}")));
    }

    Config::from_kubeconfig(&kube_options)
        .await
        .map_err(|e| KhError::Config(format!("Failed to load kubeconfig: {e}")))
}

/// Convert a dynamic object into our object model. List items can come back
/// without type information; fill it in from the resource we queried.
fn dynamic_to_object(mut item: DynamicObject, resource: &ApiResource) -> Result<Object> {
    if item.types.is_none() {
        item.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    let value: Value = serde_json::to_value(&item)?;
    Object::from_value(value)
}
