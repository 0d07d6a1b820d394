//! Project name → PostgreSQL schema name.
//!
//! The output alphabet is `[a-z0-9_]`, so schema names are spliced into SQL
//! without quoting.

use std::fmt;

/// Prefix shared by every project schema.
pub const SCHEMA_PREFIX: &str = "project_";

/// PostgreSQL truncates identifiers beyond this many bytes (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Canonical schema name of a project. Always `project_[a-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(String);

impl SchemaName {
    /// Derive the schema name for a project name.
    pub fn for_project(project: &str) -> Self {
        let folded = fold_identifier(project);
        let mut name = String::with_capacity(SCHEMA_PREFIX.len() + folded.len());
        name.push_str(SCHEMA_PREFIX);
        name.push_str(&folded);
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether PostgreSQL keeps the name as is. Longer names are silently
    /// truncated, so two of them may share a schema.
    pub fn fits_identifier_limit(&self) -> bool {
        self.0.len() <= MAX_IDENTIFIER_LEN
    }

    /// Schema-qualified relation name, e.g. `project_ga.zones`.
    pub fn qualify(&self, relation: &str) -> String {
        format!("{}.{}", self.0, relation)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fold an arbitrary string into `[a-z0-9_]`, one `char` at a time.
///
/// ASCII upper-case folds to lower-case, ASCII lower-case and digits pass
/// through, every other scalar value (multi-byte ones included) becomes a
/// single `_`. Folding is idempotent.
pub fn fold_identifier(input: &str) -> String {
    input
        .chars()
        .map(|ch| match ch {
            'A'..='Z' => ch.to_ascii_lowercase(),
            'a'..='z' | '0'..='9' => ch,
            _ => '_',
        })
        .collect()
}
