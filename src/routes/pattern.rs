use regex::Regex;

use crate::error::{Result, RouteFsError};

/// A compiled route pattern. Matching is always against the whole path;
/// the pattern text is wrapped in `^(?:...)$` so alternations anchor as a
/// unit and group numbering is preserved.
pub(crate) struct PathPattern {
    source: String,
    regex: Regex,
    num_groups: usize,
}

impl PathPattern {
    pub(crate) fn compile(source: &str) -> Result<Self> {
        let anchored = format!("^(?:{})$", source);
        let regex = Regex::new(&anchored).map_err(|e| RouteFsError::BadPattern {
            pattern: source.to_string(),
            source: e,
        })?;
        let num_groups = regex.captures_len() - 1;
        Ok(Self {
            source: source.to_string(),
            regex,
            num_groups,
        })
    }

    /// The pattern text as it was registered.
    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    /// Match `path` against the whole pattern. On a hit, yields one owned
    /// string per group in declaration order; a group that did not take
    /// part in the match yields an empty string, so the result length
    /// always equals `num_groups`.
    pub(crate) fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        Some(
            (1..=self.num_groups)
                .map(|i| {
                    caps.get(i)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                })
                .collect(),
        )
    }
}
