//! Glob-based name filters shared by the probes.

use glob::{Pattern, PatternError};

/// A set of glob patterns; a name is excluded when any pattern matches it.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_set_matches() {
        let set = PatternSet::new(&["loop*", "ram*", "/var/lib/docker/*"]).unwrap();

        assert!(set.matches("loop0"));
        assert!(set.matches("ram12"));
        assert!(set.matches("/var/lib/docker/overlay2"));
        assert!(!set.matches("sda"));
        assert!(!set.matches("nvme0n1"));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = PatternSet::new::<&str>(&[]).unwrap();
        assert!(set.is_empty());
        assert!(!set.matches("anything"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(PatternSet::new(&["[unclosed"]).is_err());
    }
}
