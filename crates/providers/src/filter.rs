use regex::Regex;

/// Include/exclude pattern pair applied to listed names.
///
/// A name is kept when it matches `include` (or `include` is unset) and does
/// not match `exclude`. Include is evaluated first.
#[derive(Clone, Debug, Default)]
pub struct NameFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl NameFilter {
    /// Compiles a filter. Empty patterns count as unset.
    ///
    /// # Errors
    ///
    /// Returns the regex error if either pattern does not compile.
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Filter that keeps every name.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    /// Whether `name` passes both patterns.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(name) {
                return false;
            }
        }

        !self.excludes(name)
    }

    /// Whether `name` matches the exclude pattern alone.
    #[must_use]
    pub fn excludes(&self, name: &str) -> bool {
        self.exclude.as_ref().is_some_and(|exclude| exclude.is_match(name))
    }

    /// Include pattern source, if any.
    #[must_use]
    pub fn include_pattern(&self) -> Option<&str> {
        self.include.as_ref().map(Regex::as_str)
    }

    /// Exclude pattern source, if any.
    #[must_use]
    pub fn exclude_pattern(&self) -> Option<&str> {
        self.exclude.as_ref().map(Regex::as_str)
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, regex::Error> {
    match pattern {
        Some(pattern) if !pattern.is_empty() => Regex::new(pattern).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_before_exclude() {
        let filter = NameFilter::new(Some("^orders"), Some("-test$")).unwrap();

        assert!(filter.matches("orders-eu"));
        assert!(!filter.matches("orders-test"));
        assert!(!filter.matches("payments"));
    }

    #[test]
    fn test_empty_patterns_keep_everything() {
        let filter = NameFilter::new(Some(""), None).unwrap();

        assert!(filter.matches("anything"));
        assert!(!filter.excludes("anything"));
        assert_eq!(filter.include_pattern(), None);
    }

    #[test]
    fn test_exclude_only() {
        let filter = NameFilter::new(None, Some(r"^\$Default$")).unwrap();

        assert!(filter.excludes("$Default"));
        assert!(!filter.excludes("analytics"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(NameFilter::new(Some("(unclosed"), None).is_err());
    }
}
