//! Exclusive resources claimed by configured components.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Something at most one component of a process may own.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Resource {
    /// A storage location written to by a component, such as a table root.
    Location(String),
}

impl Resource {
    /// A location with trailing slashes stripped so `gs://b/t/` and `gs://b/t` collide.
    ///
    /// ```
    /// use thaw_core::config::Resource;
    ///
    /// assert_eq!(Resource::location("gs://lake/events/"), Resource::location("gs://lake/events"));
    /// ```
    pub fn location(uri: &str) -> Self {
        Self::Location(uri.trim_end_matches('/').to_string())
    }

    /// Resources claimed by more than one component, with their claimants.
    pub fn conflicts<K>(
        components: impl IntoIterator<Item = (K, Vec<Resource>)>,
    ) -> HashMap<Resource, HashSet<K>>
    where
        K: Eq + Hash + Clone,
    {
        let mut claims: HashMap<Resource, HashSet<K>> = HashMap::new();
        for (key, resources) in components {
            for resource in resources {
                claims.entry(resource).or_default().insert(key.clone());
            }
        }
        claims.retain(|_, keys| keys.len() > 1);
        claims
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location(uri) => write!(f, "location:{uri}"),
        }
    }
}
