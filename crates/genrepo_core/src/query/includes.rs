//! Named relations to eager-load alongside query results.

/// Ordered, de-duplicated set of relation names.
///
/// Including a relation only changes how many store round trips a read
/// costs; results are the same with or without it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Includes(Vec<String>);

impl Includes {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a comma-separated list such as `"Orders, Address"`.
    ///
    /// Blank segments are ignored and duplicates keep their first position.
    pub fn parse(value: &str) -> Self {
        value.split(',').collect()
    }

    /// Adds one relation name.
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.push(name.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn push(&mut self, name: String) {
        let trimmed = name.trim();
        if trimmed.is_empty() || self.0.iter().any(|existing| existing == trimmed) {
            return;
        }
        self.0.push(trimmed.to_string());
    }
}

impl<S: Into<String>> FromIterator<S> for Includes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut includes = Self::default();
        for name in iter {
            includes.push(name.into());
        }
        includes
    }
}

#[cfg(test)]
mod tests {
    use super::Includes;

    #[test]
    fn parse_trims_skips_blanks_and_dedupes() {
        let includes = Includes::parse(" Orders, ,Address,Orders ");
        assert_eq!(includes.iter().collect::<Vec<_>>(), vec!["Orders", "Address"]);
    }

    #[test]
    fn empty_string_parses_to_no_includes() {
        assert!(Includes::parse("").is_empty());
        assert_eq!(Includes::none().with("Orders").len(), 1);
    }
}
