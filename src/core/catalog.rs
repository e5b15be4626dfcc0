use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use crate::ports::discovery::{Domain, DomainSource};

/// In-memory domain list fed by configuration and by route binders that
/// declare a domain.
#[derive(Debug, Default)]
pub struct DomainCatalog {
    domains: RwLock<BTreeMap<String, Domain>>,
}

impl DomainCatalog {
    pub fn new(seed: impl IntoIterator<Item = Domain>) -> Self {
        let catalog = Self::default();
        for domain in seed {
            catalog.add(domain);
        }
        catalog
    }

    /// Record a domain. Returns `false` if it was already known; a known
    /// domain keeps its prefix unless the new entry names one.
    pub fn add(&self, domain: Domain) -> bool {
        let mut domains = self.domains.write().unwrap_or_else(PoisonError::into_inner);
        match domains.get_mut(&domain.name) {
            Some(existing) => {
                if domain.prefix.is_some() {
                    existing.prefix = domain.prefix;
                }
                false
            }
            None => {
                domains.insert(domain.name.clone(), domain);
                true
            }
        }
    }
}

impl DomainSource for DomainCatalog {
    fn discover(&self) -> Vec<Domain> {
        self.domains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_deduplicates_by_name() {
        let catalog = DomainCatalog::new([Domain::new("auth")]);
        assert!(!catalog.add(Domain::new("auth")));
        assert!(catalog.add(Domain::new("recipes")));
        assert!(!catalog.add(Domain::with_prefix("auth", "/login/")));

        let found = catalog.discover();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].prefix.as_deref(), Some("/login/"));
    }
}
