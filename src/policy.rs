use std::collections::BTreeSet;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::CacheError;
use crate::error::Result;
use crate::key::check_component;
use crate::key::CacheKey;
use crate::key::OwnerId;

/// Caching rules of a single (namespace, resource) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    ttl:      Duration,
    variants: BTreeSet<String>,
}

impl CachePolicy {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl:      Duration::from_secs(ttl_secs),
            variants: BTreeSet::new(),
        }
    }

    /// Declare the variant dimension of the resource. Once declared, every key of the resource must carry one of
    /// these variants.
    pub fn with_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants.extend(variants.into_iter().map(Into::into));
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(String::as_str)
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn allows(&self, variant: Option<&str>) -> bool {
        match variant {
            Some(variant) => self.variants.contains(variant),
            None => self.variants.is_empty(),
        }
    }
}

/// The static mapping of (namespace, resource) to [`CachePolicy`].
///
/// Built once at startup and shared read-only afterwards. There is intentionally no fallback TTL: a lookup of an
/// unregistered resource is an error.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    // namespace -> resource -> policy
    policies: HashMap<String, HashMap<String, CachePolicy>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: &str, resource: &str, policy: CachePolicy) -> Result<Self> {
        self.insert(namespace, resource, policy)?;
        Ok(self)
    }

    pub fn insert(&mut self, namespace: &str, resource: &str, policy: CachePolicy) -> Result<()> {
        check_component("namespace", namespace)?;
        check_component("resource", resource)?;
        for variant in policy.variants() {
            check_component("variant", variant)?;
        }

        self.policies
            .entry(namespace.to_string())
            .or_default()
            .insert(resource.to_string(), policy);
        Ok(())
    }

    /// Resolve the policy for a key. Missing policies and variants which the policy doesn't declare are reported as
    /// [`CacheError::UnknownResourcePolicy`].
    pub fn resolve(&self, namespace: &str, resource: &str, variant: Option<&str>) -> Result<&CachePolicy> {
        let unknown = || CacheError::UnknownResourcePolicy {
            namespace: namespace.to_string(),
            resource:  resource.to_string(),
            variant:   variant.map(str::to_string),
        };

        let policy = self
            .policies
            .get(namespace)
            .and_then(|resources| resources.get(resource))
            .ok_or_else(unknown)?;

        if policy.allows(variant) {
            Ok(policy)
        }
        else {
            Err(unknown())
        }
    }

    /// Build a key after making sure it is covered by a policy.
    pub fn key(&self, namespace: &str, resource: &str, owner_id: OwnerId, variant: Option<&str>) -> Result<CacheKey> {
        self.resolve(namespace, resource, variant)?;
        CacheKey::new(namespace, resource, owner_id, variant)
    }

    /// All keys of a resource for the given owner: one per variant, or the single variantless key.
    pub fn keys_for(&self, namespace: &str, resource: &str, owner_id: OwnerId) -> Result<Vec<CacheKey>> {
        let policy = self
            .policies
            .get(namespace)
            .and_then(|resources| resources.get(resource))
            .ok_or_else(|| CacheError::UnknownResourcePolicy {
                namespace: namespace.to_string(),
                resource:  resource.to_string(),
                variant:   None,
            })?;

        if policy.has_variants() {
            policy
                .variants()
                .map(|variant| CacheKey::new(namespace, resource, owner_id, Some(variant)))
                .collect()
        }
        else {
            Ok(vec![CacheKey::new(namespace, resource, owner_id, None)?])
        }
    }

    /// Every key of every resource in a namespace, resources in lexicographic order.
    pub fn namespace_keys(&self, namespace: &str, owner_id: OwnerId) -> Result<Vec<CacheKey>> {
        let mut keys = Vec::new();
        for resource in self.resources(namespace)? {
            keys.extend(self.keys_for(namespace, resource, owner_id)?);
        }
        Ok(keys)
    }

    /// Names of the resources registered in a namespace, sorted.
    pub fn resources(&self, namespace: &str) -> Result<Vec<&str>> {
        let resources = self
            .policies
            .get(namespace)
            .ok_or_else(|| CacheError::UnknownResourcePolicy {
                namespace: namespace.to_string(),
                resource:  "*".to_string(),
                variant:   None,
            })?;
        let mut names = resources.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        Ok(names)
    }

    pub fn namespaces(&self) -> Vec<&str> {
        let mut names = self.policies.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Time-to-live of the entry stored under the key.
    pub fn ttl_of(&self, key: &CacheKey) -> Result<Duration> {
        Ok(self.resolve(key.namespace(), key.resource(), key.variant())?.ttl())
    }
}
