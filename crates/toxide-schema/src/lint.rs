use crate::ini::IniSection;
use crate::manifest::{parse_bool, ManifestError};
use indexmap::IndexMap;
use serde::Serialize;

/// A linter's flat option table, e.g. `[flake8]` or `[hacking]`.
///
/// Values stay raw; the accessors interpret them on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintSection {
    pub name: String,
    pub options: IndexMap<String, String>,
}

impl LintSection {
    pub fn from_section(section: &IniSection) -> Self {
        Self {
            name: section.name.clone(),
            options: section.entries.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ManifestError> {
        self.get(key)
            .map(|v| parse_bool(&self.name, key, v))
            .transpose()
    }

    /// Comma- or newline-separated list, blank items dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(|c| c == ',' || c == '\n')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::manifest::parse_manifest_str;

    const SAMPLE: &str = include_str!("../tests/fixtures/tox.ini");

    #[test]
    fn flake8_options() {
        let manifest = parse_manifest_str(SAMPLE, "/src").unwrap();
        let flake8 = manifest.lint_section("flake8").unwrap();
        assert_eq!(flake8.get_bool("show-source").unwrap(), Some(true));
        assert_eq!(flake8.get("builtins"), Some("_"));
        let exclude = flake8.get_list("exclude");
        assert_eq!(exclude.len(), 11);
        assert_eq!(exclude[0], ".venv");
        assert!(exclude.contains(&"*lib/python*".to_owned()));
        assert!(flake8.get_list("missing").is_empty());
    }

    #[test]
    fn hacking_options() {
        let manifest = parse_manifest_str(SAMPLE, "/src").unwrap();
        let hacking = manifest.lint_section("hacking").unwrap();
        assert_eq!(
            hacking.get("local-check-factory"),
            Some("osprofiler.hacking.checks.factory")
        );
        assert_eq!(hacking.get_bool("absent").unwrap(), None);
    }

    #[test]
    fn invalid_bool_reports_section() {
        let manifest = parse_manifest_str("[flake8]\nshow-source = sometimes\n", "/src").unwrap();
        let err = manifest
            .lint_section("flake8")
            .unwrap()
            .get_bool("show-source")
            .unwrap_err();
        assert!(err.to_string().contains("flake8.show-source"));
    }
}
