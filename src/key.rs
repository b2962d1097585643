use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CacheError;

/// Identifier of the authenticated user owning a cached resource.
pub type OwnerId = i64;

/// Separator of the serialized key components.
pub const KEY_DELIMITER: char = ':';

/// Structured cache key: `<namespace>:<resource>:<owner_id>[:<variant>]`.
///
/// The serialized form is what ends up in the key-value store and what operators see when inspecting it, e.g.
/// `analytics:trends:42:30d` or `tasks:list:42`. Since no component may contain the delimiter and the owner is always
/// numeric, the form is collision-free and parses back into the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    namespace: String,
    resource:  String,
    owner_id:  OwnerId,
    variant:   Option<String>,
}

impl CacheKey {
    pub fn new(
        namespace: impl Into<String>,
        resource: impl Into<String>,
        owner_id: OwnerId,
        variant: Option<&str>,
    ) -> Result<Self, CacheError> {
        let namespace = namespace.into();
        let resource = resource.into();
        check_component("namespace", &namespace)?;
        check_component("resource", &resource)?;
        if let Some(variant) = variant {
            check_component("variant", variant)?;
        }

        Ok(Self {
            namespace,
            resource,
            owner_id,
            variant: variant.map(str::to_string),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Short human-readable name of the key within its owner's namespace: `overview`, `trends:7d`.
    pub fn label(&self) -> String {
        match self.variant {
            Some(ref variant) => format!("{}{KEY_DELIMITER}{variant}", self.resource),
            None => self.resource.clone(),
        }
    }
}

/// Components must be non-empty and free of the delimiter, otherwise two different keys could serialize identically.
pub(crate) fn check_component(what: &str, value: &str) -> Result<(), CacheError> {
    if value.is_empty() {
        return Err(CacheError::InvalidKey(format!("empty {what}")));
    }
    if value.contains(KEY_DELIMITER) {
        return Err(CacheError::InvalidKey(format!(
            "{what} '{value}' contains the '{KEY_DELIMITER}' delimiter"
        )));
    }
    Ok(())
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{KEY_DELIMITER}{}{KEY_DELIMITER}{}",
            self.namespace, self.resource, self.owner_id
        )?;
        if let Some(ref variant) = self.variant {
            write!(f, "{KEY_DELIMITER}{variant}")?;
        }
        Ok(())
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split(KEY_DELIMITER).collect::<Vec<_>>();
        let (namespace, resource, owner, variant) = match parts.as_slice() {
            [namespace, resource, owner] => (namespace, resource, owner, None),
            [namespace, resource, owner, variant] => (namespace, resource, owner, Some(*variant)),
            _ => {
                return Err(CacheError::InvalidKey(format!(
                    "'{s}' is not of the form <namespace>:<resource>:<owner>[:<variant>]"
                )))
            }
        };

        let owner_id = owner
            .parse::<OwnerId>()
            .map_err(|err| CacheError::InvalidKey(format!("owner '{owner}' in '{s}': {err}")))?;

        Self::new(*namespace, *resource, owner_id, variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_form() {
        let key = CacheKey::new("analytics", "trends", 42, Some("30d")).unwrap();
        assert_eq!(key.to_string(), "analytics:trends:42:30d");
        let key = CacheKey::new("tasks", "list", 42, None).unwrap();
        assert_eq!(key.to_string(), "tasks:list:42");
    }

    #[test]
    fn test_parse_back() {
        for raw in ["analytics:trends:42:30d", "tasks:list:7", "session:user:-1"] {
            let key: CacheKey = raw.parse().unwrap();
            assert_eq!(key.to_string(), raw);
        }

        let key: CacheKey = "analytics:trends:42:90d".parse().unwrap();
        assert_eq!(key.namespace(), "analytics");
        assert_eq!(key.resource(), "trends");
        assert_eq!(key.owner_id(), 42);
        assert_eq!(key.variant(), Some("90d"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("analytics:overview".parse::<CacheKey>().is_err());
        assert!("analytics:overview:abc".parse::<CacheKey>().is_err());
        assert!("analytics:trends:42:7d:extra".parse::<CacheKey>().is_err());
        assert!("::42".parse::<CacheKey>().is_err());
        assert!(CacheKey::new("ana:lytics", "overview", 1, None).is_err());
        assert!(CacheKey::new("analytics", "overview", 1, Some("")).is_err());
    }

    #[test]
    fn test_equality_covers_all_components() {
        let base = CacheKey::new("analytics", "trends", 42, Some("7d")).unwrap();
        assert_eq!(base, CacheKey::new("analytics", "trends", 42, Some("7d")).unwrap());
        assert_ne!(base, CacheKey::new("analytics", "trends", 43, Some("7d")).unwrap());
        assert_ne!(base, CacheKey::new("analytics", "trends", 42, Some("30d")).unwrap());
        assert_ne!(base, CacheKey::new("analytics", "trends", 42, None).unwrap());
        assert_ne!(base, CacheKey::new("tasks", "trends", 42, Some("7d")).unwrap());
    }

    #[test]
    fn test_label() {
        assert_eq!(CacheKey::new("analytics", "trends", 1, Some("7d")).unwrap().label(), "trends:7d");
        assert_eq!(CacheKey::new("analytics", "overview", 1, None).unwrap().label(), "overview");
    }
}
