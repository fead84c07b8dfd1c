//! Evaluator: the entry point for the status evaluation cycle
//!
//! The evaluator performs the following steps:
//!   - loading fresh data for the object through the loader,
//!   - finding an appropriate analyzer for the object,
//!   - running the analyzer, which may re-enter the evaluator for
//!     sub-queries.

pub mod poller;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::analyze::{AnalyzerRegistry, DefaultAnalyzer};
use crate::client::ClusterClient;
use crate::error::Result;
use crate::loader::Loader;
use crate::object::{GroupKind, GroupKindMatcher, GroupResource, Object, Scope};
use crate::query::Query;
use crate::status::ObjectStatus;

/// A per-kind strategy computing the status of an object.
#[async_trait]
pub trait ObjectAnalyzer: Send + Sync {
    /// Whether this analyzer supports the given object. Used when searching
    /// for the appropriate analyzer during dispatch.
    fn supports(&self, obj: &Object) -> bool;

    /// Calculate the status for the object. Sub-queries are routed back
    /// through the evaluator.
    async fn analyze(&self, eval: &Evaluator, obj: Arc<Object>) -> ObjectStatus;
}

/// A root resource to evaluate on every poll tick.
#[derive(Clone)]
pub enum RootTarget {
    /// A concrete object, e.g. read from a manifest.
    Object(Arc<Object>),
    /// A single named resource.
    Resource {
        resource: GroupResource,
        namespace: Option<String>,
        name: String,
    },
    /// Every object of one kind.
    Kind {
        kind: GroupKind,
        namespace: Option<String>,
    },
}

pub struct Evaluator {
    client: Arc<dyn ClusterClient>,
    loader: Mutex<Loader>,
    analyzers: Vec<Box<dyn ObjectAnalyzer>>,
    ignored: Vec<GroupKind>,
    default_analyzer: DefaultAnalyzer,
    /// Identities already analyzed in the current evaluation; breaks cycles
    /// in related-object graphs.
    visited: Mutex<HashSet<String>>,
}

impl Evaluator {
    pub fn new(client: Arc<dyn ClusterClient>, registry: AnalyzerRegistry) -> Self {
        let (analyzers, ignored) = registry.into_parts();
        Evaluator {
            loader: Mutex::new(Loader::new(Arc::clone(&client), ignored.clone())),
            client,
            analyzers,
            ignored,
            default_analyzer: DefaultAnalyzer,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Clear all cached state, forcing fresh data on the next evaluation.
    pub async fn reset(&self) {
        self.loader.lock().await.reset();
        self.visited.lock().await.clear();
    }

    /// Evaluate the status of the object: fetch the most recent version and
    /// run the appropriate analyzer on it.
    pub async fn eval(&self, obj: &Arc<Object>) -> ObjectStatus {
        self.visited.lock().await.clear();

        let fresh = { self.loader.lock().await.get(obj).await };
        match fresh {
            Ok(fresh) => self.analyze_object(fresh, None).await,
            Err(e) => ObjectStatus::unknown_with_error(Arc::clone(obj), &e),
        }
    }

    /// Load the objects specified by the query and analyze each of them,
    /// with the override or the dispatched analyzer.
    pub async fn eval_query(
        &self,
        query: &Query,
        override_analyzer: Option<&dyn ObjectAnalyzer>,
    ) -> Result<Vec<ObjectStatus>> {
        let outcome = { self.loader.lock().await.load(query).await };
        if let Some(error) = outcome.error {
            if outcome.objects.is_empty() {
                return Err(error);
            }
            warn!(error = %error, "partial load failure");
        }

        let mut statuses = Vec::with_capacity(outcome.objects.len());
        for obj in outcome.objects {
            statuses.push(self.analyze_object(obj, override_analyzer).await);
        }
        Ok(statuses)
    }

    /// Resolve a `(group, resource)` reference to a kind and evaluate the
    /// named object.
    pub async fn eval_resource(
        &self,
        resource: &GroupResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Vec<ObjectStatus>> {
        let kind = self.client.resource_to_kind(resource)?;
        let namespace = if self.client.is_namespaced(&kind)? {
            namespace
        } else {
            None
        };
        let query = Query::Ref {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        };
        self.eval_query(&query, None).await
    }

    /// Evaluate one root target, which may expand to several statuses.
    pub async fn eval_target(&self, target: &RootTarget) -> Result<Vec<ObjectStatus>> {
        match target {
            RootTarget::Object(obj) => Ok(vec![self.eval(obj).await]),
            RootTarget::Resource {
                resource,
                namespace,
                name,
            } => {
                self.visited.lock().await.clear();
                self.eval_resource(resource, namespace.as_deref(), name).await
            }
            RootTarget::Kind { kind, namespace } => {
                self.visited.lock().await.clear();
                let scope = if self.client.is_namespaced(kind)? {
                    match namespace {
                        Some(ns) => Scope::Namespaced(ns.clone()),
                        None => Scope::All,
                    }
                } else {
                    Scope::Cluster
                };
                let query = Query::Kind {
                    scope,
                    matcher: GroupKindMatcher::kinds([kind.clone()]),
                };
                self.eval_query(&query, None).await
            }
        }
    }

    pub fn resource_to_kind(&self, resource: &GroupResource) -> Result<GroupKind> {
        self.client.resource_to_kind(resource)
    }

    pub fn is_ignored(&self, kind: &GroupKind) -> bool {
        self.ignored.contains(kind)
    }

    /// Best-effort pod log fetch for analyzers.
    pub async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail_lines: i64,
    ) -> Result<String> {
        self.client
            .pod_logs(namespace, name, container, tail_lines)
            .await
    }

    async fn analyze_object(
        &self,
        obj: Arc<Object>,
        override_analyzer: Option<&dyn ObjectAnalyzer>,
    ) -> ObjectStatus {
        {
            let mut visited = self.visited.lock().await;
            if !visited.insert(obj.identity()) {
                // Already part of this evaluation: break the cycle.
                return ObjectStatus::unknown(obj);
            }
        }

        let analyzer = override_analyzer.or_else(|| {
            self.analyzers
                .iter()
                .find(|a| a.supports(&obj))
                .map(|a| a.as_ref())
        });
        match analyzer {
            Some(analyzer) => analyzer.analyze(self, obj).await,
            None => self.default_analyzer.analyze(self, obj).await,
        }
    }
}
