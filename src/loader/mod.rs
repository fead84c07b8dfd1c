//! Per-namespace object cache with ownership tracking
//!
//! The loader is responsible for loading and caching the objects from the
//! cluster and for finding objects based on their ownership relations. A
//! query is answered in two phases: first the cache is populated for the
//! query's scope and matcher (preload), then the query filters the cached
//! population. Owner-reference queries depend on this order: the ownership
//! index is only usable once the candidate population is in the cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::client::ClusterClient;
use crate::error::{KhError, Result};
use crate::object::{GroupKind, GroupKindMatcher, Object, Scope, Uid};
use crate::query::Query;

/// Objects loaded from a single scope, the matcher used to load them, and
/// whether the data needs refilling after a matcher change.
struct NsCache {
    objects: HashMap<GroupKind, Vec<Arc<Object>>>,
    matcher: GroupKindMatcher,
    needs_refill: bool,
}

impl NsCache {
    fn new(ignored: &[GroupKind]) -> Self {
        // Ignored kinds are excluded up front, so include-all matchers never
        // expand to them. Explicitly included kinds still win over the
        // exclusion set.
        NsCache {
            objects: HashMap::new(),
            matcher: GroupKindMatcher {
                excluded: ignored.iter().cloned().collect(),
                ..Default::default()
            },
            needs_refill: false,
        }
    }

    fn append(&mut self, obj: Arc<Object>) {
        self.objects.entry(obj.group_kind()).or_default().push(obj);
    }

    fn get_all(&self) -> impl Iterator<Item = &Arc<Object>> {
        self.objects.values().flatten()
    }

    /// Merge the matcher in; returns true if it changed.
    fn update_matcher(&mut self, other: &GroupKindMatcher) -> bool {
        let merged = self.matcher.merge(other);
        if merged != self.matcher {
            self.matcher = merged;
            self.needs_refill = true;
            return true;
        }
        false
    }
}

/// Objects resolved by a query, plus the first listing error encountered
/// while populating the cache.
pub struct LoadOutcome {
    pub objects: Vec<Arc<Object>>,
    pub error: Option<KhError>,
}

/// Loads and caches objects from the cluster.
pub struct Loader {
    client: Arc<dyn ClusterClient>,
    /// Mapping of UID to the object.
    objects: HashMap<Uid, Arc<Object>>,
    /// Mapping of scope to its cache.
    caches: HashMap<Scope, NsCache>,
    /// Mapping of owner UID to the set of owned UIDs.
    ownership: HashMap<Uid, HashSet<Uid>>,
    /// Scopes whose ownership relations need refreshing after new ingests.
    ownership_dirty: Vec<Scope>,
    ignored: Vec<GroupKind>,
}

impl Loader {
    pub fn new(client: Arc<dyn ClusterClient>, ignored: Vec<GroupKind>) -> Self {
        Loader {
            client,
            objects: HashMap::new(),
            caches: HashMap::new(),
            ownership: HashMap::new(),
            ownership_dirty: Vec::new(),
            ignored,
        }
    }

    /// Load the objects specified by the query, using the cache to avoid
    /// listing the same kinds multiple times.
    pub async fn load(&mut self, query: &Query) -> LoadOutcome {
        let scope = query.scope();

        self.cache_mut(&scope).update_matcher(&query.matcher());
        let error = if self.caches[&scope].needs_refill {
            self.refill(&scope).await
        } else {
            None
        };

        let objects = query.eval(self);
        LoadOutcome { objects, error }
    }

    /// Return the cached version of the object, fetching it from the cluster
    /// on a miss.
    pub async fn get(&mut self, obj: &Object) -> Result<Arc<Object>> {
        if !obj.uid().is_empty() {
            if let Some(cached) = self.objects.get(obj.uid()) {
                return Ok(Arc::clone(cached));
            }
        }

        let fresh = self
            .client
            .get(&obj.group_kind(), obj.namespace(), obj.name())
            .await?;
        Ok(self.ingest(fresh))
    }

    /// Drop all cached state, forcing fresh data on the next load.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.caches.clear();
        self.ownership.clear();
        self.ownership_dirty.clear();
    }

    /// Objects from the cache that match the matcher. Expects the cache to
    /// be populated; intended to run during `Query::eval` after the preload
    /// phase of [`Loader::load`].
    pub(crate) fn filter(&self, scope: &Scope, matcher: &GroupKindMatcher) -> Vec<Arc<Object>> {
        let mut ret = Vec::new();
        let mut collect = |cache: &NsCache| {
            for (gk, objects) in &cache.objects {
                if matcher.matches(gk) {
                    ret.extend(objects.iter().cloned());
                }
            }
        };

        match scope {
            Scope::All => self.caches.values().for_each(&mut collect),
            scope => {
                if let Some(cache) = self.caches.get(scope) {
                    collect(cache);
                }
            }
        }
        ret
    }

    /// Restrict candidates to objects owned by the given UID.
    pub(crate) fn filter_owned_by(
        &mut self,
        owner_uid: &str,
        candidates: Vec<Arc<Object>>,
    ) -> Vec<Arc<Object>> {
        self.refresh_ownership();

        let Some(children) = self.ownership.get(owner_uid) else {
            return Vec::new();
        };
        candidates
            .into_iter()
            .filter(|cand| children.contains(cand.uid()))
            .collect()
    }

    async fn refill(&mut self, scope: &Scope) -> Option<KhError> {
        let cache = &self.caches[scope];
        let loaded_kinds: Vec<GroupKind> = cache.objects.keys().cloned().collect();
        let matcher = cache.matcher.clone();

        let outcome = self
            .client
            .list_with_matcher(scope, &matcher, &loaded_kinds)
            .await;

        if outcome.error.is_none() {
            self.cache_mut(scope).needs_refill = false;
        }

        for obj in outcome.objects {
            self.ingest(obj);
        }

        if !self.ownership_dirty.contains(scope) {
            self.ownership_dirty.push(scope.clone());
        }

        outcome.error
    }

    fn ingest(&mut self, obj: Object) -> Arc<Object> {
        let obj = Arc::new(obj);
        if !obj.uid().is_empty() {
            self.objects.insert(obj.uid().to_string(), Arc::clone(&obj));
        }
        self.cache_mut(&obj.scope()).append(Arc::clone(&obj));
        obj
    }

    fn refresh_ownership(&mut self) {
        for scope in std::mem::take(&mut self.ownership_dirty) {
            let Some(cache) = self.caches.get(&scope) else {
                continue;
            };
            let mut edges = Vec::new();
            for obj in cache.get_all() {
                for owner_ref in obj.owner_references() {
                    edges.push((owner_ref.uid.clone(), obj.uid().to_string()));
                }
            }
            for (owner, child) in edges {
                self.ownership.entry(owner).or_default().insert(child);
            }
        }
    }

    fn cache_mut(&mut self, scope: &Scope) -> &mut NsCache {
        let ignored = &self.ignored;
        self.caches
            .entry(scope.clone())
            .or_insert_with(|| NsCache::new(ignored))
    }
}
