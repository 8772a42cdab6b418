//! Alias resolution
//!
//! Some system collections are addressed by a reserved name ("favorites",
//! "research", ...) rather than their storage id. The table is data-driven
//! and validated at bootstrap so every alias maps to exactly one collection.

use tracing::debug;

use crate::config::AliasEntry;
use crate::error::{EngineError, EngineResult};
use crate::types::{Collection, CollectionId};

/// Outcome of looking a name up in the alias table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasLookup {
    /// Name is not a reserved alias
    NotAlias,
    /// Alias resolved to a system collection
    Resolved(CollectionId),
    /// Alias is reserved but no system collection carries its label yet
    Unresolved,
}

/// Maps reserved names to system collections
#[derive(Debug, Clone)]
pub struct AliasResolver {
    entries: Vec<AliasEntry>,
}

impl AliasResolver {
    /// Build a resolver, rejecting tables with blank or duplicate entries
    pub fn new(entries: Vec<AliasEntry>) -> EngineResult<Self> {
        for (i, entry) in entries.iter().enumerate() {
            if entry.alias.trim().is_empty() || entry.label.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "alias entry {} has an empty alias or label",
                    i
                )));
            }
            for other in &entries[..i] {
                if other.alias == entry.alias {
                    return Err(EngineError::Validation(format!(
                        "alias '{}' declared twice",
                        entry.alias
                    )));
                }
                if other.label.eq_ignore_ascii_case(&entry.label) {
                    return Err(EngineError::Validation(format!(
                        "label '{}' claimed by aliases '{}' and '{}'",
                        entry.label, other.alias, entry.alias
                    )));
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Label reserved for the alias, if `name` is one
    pub fn label_for(&self, name: &str) -> Option<&str> {
        self.entry(name).map(|e| e.label.as_str())
    }

    /// Whether a user-supplied label collides with a reserved system label
    pub fn is_reserved_label(&self, label: &str) -> bool {
        let label = label.trim();
        self.entries
            .iter()
            .any(|e| e.label.eq_ignore_ascii_case(label) || e.alias.eq_ignore_ascii_case(label))
    }

    fn entry(&self, name: &str) -> Option<&AliasEntry> {
        self.entries.iter().find(|e| e.alias == name)
    }

    fn matches<'a>(
        entry: &AliasEntry,
        collections: impl IntoIterator<Item = &'a Collection>,
    ) -> Vec<&'a Collection> {
        collections
            .into_iter()
            .filter(|c| c.is_system_defined && c.label.trim().eq_ignore_ascii_case(&entry.label))
            .collect()
    }

    /// Look `name` up against the known collections
    pub fn lookup<'a>(
        &self,
        name: &str,
        collections: impl IntoIterator<Item = &'a Collection>,
    ) -> AliasLookup {
        let Some(entry) = self.entry(name) else {
            return AliasLookup::NotAlias;
        };
        match Self::matches(entry, collections).first() {
            Some(collection) => AliasLookup::Resolved(collection.id.clone()),
            None => AliasLookup::Unresolved,
        }
    }

    /// Resolve a name to a collection id. Non-aliases and aliases without a
    /// backing collection come back unchanged.
    pub fn resolve<'a>(
        &self,
        name: &str,
        collections: impl IntoIterator<Item = &'a Collection>,
    ) -> CollectionId {
        match self.lookup(name, collections) {
            AliasLookup::Resolved(id) => id,
            AliasLookup::Unresolved => {
                debug!("Alias '{}' has no backing collection yet", name);
                name.to_string()
            }
            AliasLookup::NotAlias => name.to_string(),
        }
    }

    /// Aliases that no system collection carries yet
    pub fn missing<'a>(
        &self,
        collections: impl IntoIterator<Item = &'a Collection> + Clone,
    ) -> Vec<&AliasEntry> {
        self.entries
            .iter()
            .filter(|e| Self::matches(e, collections.clone()).is_empty())
            .collect()
    }

    /// Assert every alias resolves to exactly one system collection
    pub fn validate<'a>(
        &self,
        collections: impl IntoIterator<Item = &'a Collection> + Clone,
    ) -> EngineResult<()> {
        for entry in &self.entries {
            let found = Self::matches(entry, collections.clone());
            match found.len() {
                1 => {}
                0 => {
                    return Err(EngineError::Validation(format!(
                        "alias '{}' has no system collection labelled '{}'",
                        entry.alias, entry.label
                    )))
                }
                n => {
                    return Err(EngineError::Validation(format!(
                        "alias '{}' matches {} system collections labelled '{}'",
                        entry.alias, n, entry.label
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::Owner;

    fn system(id: &str, label: &str) -> Collection {
        Collection {
            id: id.to_string(),
            label: label.to_string(),
            color: None,
            is_system_defined: true,
            owner: Owner::User("u1".to_string()),
        }
    }

    fn resolver() -> AliasResolver {
        AliasResolver::new(Config::default().aliases).unwrap()
    }

    #[test]
    fn test_resolves_alias_to_system_collection() {
        let collections = vec![system("a1b2", "Favorites"), system("c3d4", "Workspace")];
        let r = resolver();
        assert_eq!(r.resolve("favorites", &collections), "a1b2");
        assert_eq!(r.resolve("research", &collections), "c3d4");
    }

    #[test]
    fn test_unresolved_alias_falls_back_to_name() {
        let r = resolver();
        let none: Vec<Collection> = Vec::new();
        assert_eq!(r.resolve("personal-context", &none), "personal-context");
        assert_eq!(r.lookup("personal-context", &none), AliasLookup::Unresolved);
    }

    #[test]
    fn test_real_id_is_unchanged() {
        let collections = vec![system("a1b2", "Favorites")];
        let r = resolver();
        assert_eq!(r.resolve("a1b2", &collections), "a1b2");
        let once = r.resolve("favorites", &collections);
        assert_eq!(r.resolve(&once, &collections), once);
    }

    #[test]
    fn test_custom_collection_with_reserved_label_is_ignored() {
        let mut custom = system("zz", "Favorites");
        custom.is_system_defined = false;
        let r = resolver();
        assert_eq!(r.lookup("favorites", &[custom]), AliasLookup::Unresolved);
    }

    #[test]
    fn test_validate_detects_missing_and_duplicates() {
        let r = resolver();
        let partial = vec![system("1", "Favorites")];
        assert!(r.validate(&partial).is_err());
        assert_eq!(r.missing(&partial).len(), 3);

        let mut full = vec![
            system("1", "Favorites"),
            system("2", "Workspace"),
            system("3", "Watchlist"),
            system("4", "Personal Context"),
        ];
        assert!(r.validate(&full).is_ok());

        full.push(system("5", "favorites"));
        let err = r.validate(&full).unwrap_err();
        assert!(err.to_string().contains("matches 2"));
    }

    #[test]
    fn test_table_rejects_duplicate_labels() {
        let entries = vec![
            AliasEntry::new("favorites", "Favorites"),
            AliasEntry::new("starred", "favorites"),
        ];
        assert!(AliasResolver::new(entries).is_err());
    }

    #[test]
    fn test_reserved_label() {
        let r = resolver();
        assert!(r.is_reserved_label("  watchlist "));
        assert!(!r.is_reserved_label("Rust Deep Dive"));
    }
}
