//! Line-oriented reader for the tox.ini dialect of INI.
//!
//! Sections are `[name]`, entries are `key = value` or `key: value`. Indented lines
//! continue the previous value and are joined with `\n`; a value line ending in a
//! backslash is joined to its continuation with a single space instead. Lines whose
//! first non-blank character is `#` or `;` are comments, also inside multi-line
//! values. Inline comments are not recognized.

use crate::manifest::ManifestError;
use indexmap::IndexMap;

/// One `[section]` with its entries in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    /// 1-based line of the section header.
    pub line: usize,
    pub entries: IndexMap<String, String>,
}

impl IniSection {
    fn new(name: &str, line: usize) -> Self {
        Self {
            name: name.to_owned(),
            line,
            entries: IndexMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// A parsed INI document: sections in declaration order, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: IndexMap<String, IniSection>,
}

impl IniDocument {
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.values()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

pub fn parse_ini(input: &str) -> Result<IniDocument, ManifestError> {
    let mut doc = IniDocument::default();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let indented = raw.starts_with(|c: char| c.is_whitespace());

        if indented {
            if let (Some(section), Some(key)) = (current.as_deref(), last_key.as_deref()) {
                let value = doc
                    .sections
                    .get_mut(section)
                    .and_then(|s| s.entries.get_mut(key))
                    .ok_or_else(|| syntax(line_no, "continuation without a value"))?;
                if value.ends_with('\\') {
                    value.pop();
                    let kept = value.trim_end().len();
                    value.truncate(kept);
                    value.push(' ');
                } else {
                    value.push('\n');
                }
                value.push_str(trimmed);
                continue;
            }
        }

        if let Some(rest) = trimmed.strip_prefix('[') {
            let Some(name) = rest.strip_suffix(']') else {
                return Err(syntax(line_no, "unterminated section header"));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(syntax(line_no, "empty section name"));
            }
            if doc.sections.contains_key(name) {
                return Err(ManifestError::DuplicateSection {
                    name: name.to_owned(),
                    line: line_no,
                });
            }
            doc.sections
                .insert(name.to_owned(), IniSection::new(name, line_no));
            current = Some(name.to_owned());
            last_key = None;
            continue;
        }

        let Some(section) = current.as_deref() else {
            return Err(syntax(line_no, "entry outside of any section"));
        };
        let Some(split_at) = trimmed.find(|c| c == '=' || c == ':') else {
            return Err(syntax(line_no, "expected 'key = value'"));
        };
        let key = trimmed[..split_at].trim();
        let value = trimmed[split_at + 1..].trim();
        if key.is_empty() {
            return Err(syntax(line_no, "empty key"));
        }

        let entries = &mut doc
            .sections
            .get_mut(section)
            .ok_or_else(|| syntax(line_no, "entry outside of any section"))?
            .entries;
        if entries.contains_key(key) {
            return Err(ManifestError::DuplicateKey {
                section: section.to_owned(),
                key: key.to_owned(),
                line: line_no,
            });
        }
        entries.insert(key.to_owned(), value.to_owned());
        last_key = Some(key.to_owned());
    }

    Ok(doc)
}

fn syntax(line: usize, message: &str) -> ManifestError {
    ManifestError::Syntax {
        line,
        message: message.to_owned(),
    }
}
