//! Name filter applied to a discovery before it is run

use crate::discovery::{CaseInfo, Discovery};

/// Selects tests whose method name, description, tag or class name
/// contains a substring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFilter {
    pattern: String,
}

impl TestFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// A filter from an optional configured pattern; empty means no filter
    pub fn from_pattern(pattern: Option<&str>) -> Option<Self> {
        pattern.filter(|p| !p.is_empty()).map(Self::new)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, case: &CaseInfo) -> bool {
        let id = &case.id;
        id.name.contains(&self.pattern)
            || id.class.contains(&self.pattern)
            || id
                .description
                .as_deref()
                .is_some_and(|d| d.contains(&self.pattern))
            || id.tags.iter().any(|t| t == &self.pattern)
    }

    pub fn apply(&self, discovery: Discovery) -> Discovery {
        let before = discovery.len();
        let filtered = discovery.retain(|case| self.matches(case));
        tracing::debug!(
            pattern = %self.pattern,
            selected = filtered.len(),
            of = before,
            "filter applied"
        );
        filtered
    }
}
