//! Keyword resolver
//!
//! Classifies query text by raw substring match against an ordered keyword
//! table. First match wins. This is not a query parser: "postsecondary"
//! matches `posts`.

use crate::config::ResolverEntry;

/// All users as a JSON array of row objects
pub const USERS_QUERY: &str = "SELECT json_agg(row_to_json(users)) FROM users;";

/// Published posts with their author embedded one level deep
pub const POSTS_QUERY: &str = "SELECT json_agg(
    json_build_object(
        'id', p.id,
        'title', p.title,
        'content', p.content,
        'published', p.published,
        'author', json_build_object('name', u.name, 'email', u.email)
    )
) FROM posts p JOIN users u ON p.author_id = u.id WHERE p.published = true;";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("keyword table is empty")]
    Empty,

    #[error("resolver entry {0} has an empty keyword, field or query")]
    BlankEntry(usize),

    #[error("field '{0}' is mapped more than once")]
    DuplicateField(String),
}

/// Immutable keyword table, built once at startup
#[derive(Debug, Clone)]
pub struct Resolver {
    entries: Vec<ResolverEntry>,
}

impl Resolver {
    pub fn new(entries: Vec<ResolverEntry>) -> Result<Self, ResolverError> {
        if entries.is_empty() {
            return Err(ResolverError::Empty);
        }
        for (i, entry) in entries.iter().enumerate() {
            if entry.keyword.is_empty() || entry.field.is_empty() || entry.query.trim().is_empty()
            {
                return Err(ResolverError::BlankEntry(i));
            }
            if entries[..i].iter().any(|prev| prev.field == entry.field) {
                return Err(ResolverError::DuplicateField(entry.field.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// Configured table, or the built-in one when none is configured
    pub fn from_config(entries: &[ResolverEntry]) -> Result<Self, ResolverError> {
        if entries.is_empty() {
            Ok(Self::default())
        } else {
            Self::new(entries.to_vec())
        }
    }

    /// First entry whose keyword occurs anywhere in `query`
    pub fn resolve(&self, query: &str) -> Option<&ResolverEntry> {
        self.entries
            .iter()
            .find(|entry| query.contains(entry.keyword.as_str()))
    }

    pub fn entries(&self) -> &[ResolverEntry] {
        &self.entries
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            entries: vec![
                ResolverEntry::new("users", "users", USERS_QUERY),
                ResolverEntry::new("posts", "posts", POSTS_QUERY),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_users() {
        let resolver = Resolver::default();
        let entry = resolver.resolve("{ users { id name email } }").unwrap();
        assert_eq!(entry.field, "users");
        assert_eq!(entry.query, USERS_QUERY);
    }

    #[test]
    fn test_resolves_posts() {
        let resolver = Resolver::default();
        let entry = resolver.resolve("{ posts { id title author { name } } }").unwrap();
        assert_eq!(entry.field, "posts");
    }

    #[test]
    fn test_users_has_priority_over_posts() {
        let resolver = Resolver::default();
        let entry = resolver.resolve("{ posts { id } users { id } }").unwrap();
        assert_eq!(entry.field, "users");
    }

    #[test]
    fn test_raw_substring_matching() {
        let resolver = Resolver::default();
        assert_eq!(
            resolver.resolve("{ postsecondary }").map(|e| e.field.as_str()),
            Some("posts")
        );
        assert!(resolver.resolve("{ discussions }").is_none());
        // Case sensitive
        assert!(resolver.resolve("{ USERS }").is_none());
    }

    #[test]
    fn test_no_match() {
        let resolver = Resolver::default();
        assert!(resolver.resolve("{ unknownField }").is_none());
        assert!(resolver.resolve("").is_none());
    }

    #[test]
    fn test_from_config_uses_default_when_empty() {
        let resolver = Resolver::from_config(&[]).unwrap();
        assert_eq!(resolver.entries().len(), 2);
    }

    #[test]
    fn test_from_config_override() {
        let resolver = Resolver::from_config(&[ResolverEntry::new(
            "tags",
            "tags",
            "SELECT json_agg(t) FROM tags t",
        )])
        .unwrap();
        assert!(resolver.resolve("{ users }").is_none());
        assert_eq!(resolver.resolve("{ tags }").unwrap().field, "tags");
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert_eq!(Resolver::new(vec![]).unwrap_err(), ResolverError::Empty);
        assert_eq!(
            Resolver::new(vec![ResolverEntry::new("", "x", "SELECT 1")]).unwrap_err(),
            ResolverError::BlankEntry(0)
        );
        assert_eq!(
            Resolver::new(vec![
                ResolverEntry::new("a", "x", "SELECT 1"),
                ResolverEntry::new("b", "x", "SELECT 2"),
            ])
            .unwrap_err(),
            ResolverError::DuplicateField("x".to_string())
        );
    }
}
