use crate::envlist::expand_env_list;
use crate::ini::{parse_ini, IniDocument, IniSection};
use crate::lint::LintSection;
use crate::subst::expand_section_refs;
use crate::types::EnvName;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TOX_SECTION: &str = "tox";
pub const BASE_ENV_SECTION: &str = "testenv";
pub const ENV_SECTION_PREFIX: &str = "testenv:";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("duplicate section [{name}] at line {line}")]
    DuplicateSection { name: String, line: usize },
    #[error("duplicate key '{key}' in [{section}] at line {line}")]
    DuplicateKey {
        section: String,
        key: String,
        line: usize,
    },
    #[error("unknown environment '{0}': not in envlist and no [testenv:{0}] section")]
    UnknownEnvironment(String),
    #[error("invalid boolean for {section}.{key}: '{value}'")]
    InvalidBool {
        section: String,
        key: String,
        value: String,
    },
    #[error("invalid setenv line '{0}', expected 'NAME=value'")]
    InvalidSetenv(String),
    #[error("reference {{[{section}]{key}}} does not resolve")]
    MissingReference { section: String, key: String },
    #[error("circular reference through {{[{section}]{key}}}")]
    CircularReference { section: String, key: String },
    #[error("unknown substitution key '{{{0}}}'")]
    UnknownSubstitution(String),
    #[error("environment variable '{0}' is not set and has no default")]
    MissingEnvVar(String),
    #[error("invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },
}

/// Global settings from the `[tox]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToxSection {
    pub envlist: Vec<EnvName>,
    pub minversion: Option<String>,
    pub skipsdist: bool,
    /// Raw value; substituted when the work layout is created.
    pub toxworkdir: String,
    pub skip_missing_interpreters: bool,
}

impl Default for ToxSection {
    fn default() -> Self {
        Self {
            envlist: Vec::new(),
            minversion: None,
            skipsdist: false,
            toxworkdir: default_toxworkdir(),
            skip_missing_interpreters: false,
        }
    }
}

fn default_toxworkdir() -> String {
    "{toxinidir}/.tox".to_owned()
}

/// A parsed manifest: the raw INI document plus the typed `[tox]` view.
///
/// Environment sections stay raw; [`crate::resolve`] turns one of them into an
/// [`crate::EnvConfig`] on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    toxinidir: PathBuf,
    tox: ToxSection,
    document: IniDocument,
}

impl Manifest {
    pub fn from_document(
        document: IniDocument,
        toxinidir: impl Into<PathBuf>,
    ) -> Result<Self, ManifestError> {
        let tox = parse_tox_section(&document)?;
        Ok(Self {
            toxinidir: toxinidir.into(),
            tox,
            document,
        })
    }

    /// Directory containing the manifest.
    pub fn toxinidir(&self) -> &Path {
        &self.toxinidir
    }

    pub fn tox(&self) -> &ToxSection {
        &self.tox
    }

    pub fn document(&self) -> &IniDocument {
        &self.document
    }

    pub fn envlist(&self) -> &[EnvName] {
        &self.tox.envlist
    }

    /// Names of all `[testenv:NAME]` sections, in declaration order.
    pub fn declared_envs(&self) -> Vec<EnvName> {
        self.document
            .sections()
            .filter_map(|s| s.name.strip_prefix(ENV_SECTION_PREFIX))
            .map(|n| EnvName::new(n.trim()))
            .collect()
    }

    /// The envlist followed by every declared environment not already in it.
    pub fn all_envs(&self) -> Vec<EnvName> {
        let mut out = self.tox.envlist.clone();
        for name in self.declared_envs() {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    /// Whether `name` is known either through the envlist or a `[testenv:NAME]` section.
    pub fn has_env(&self, name: &str) -> bool {
        self.tox.envlist.iter().any(|e| e == name) || self.env_section(name).is_some()
    }

    pub fn env_section(&self, name: &str) -> Option<&IniSection> {
        self.document
            .section(&format!("{ENV_SECTION_PREFIX}{name}"))
    }

    pub fn base_env_section(&self) -> Option<&IniSection> {
        self.document.section(BASE_ENV_SECTION)
    }

    pub fn tox_section(&self) -> Option<&IniSection> {
        self.document.section(TOX_SECTION)
    }

    /// Sections that are neither `[tox]` nor environment sections, e.g. `[flake8]`.
    pub fn lint_sections(&self) -> Vec<LintSection> {
        self.document
            .sections()
            .filter(|s| !is_runner_section(&s.name))
            .map(LintSection::from_section)
            .collect()
    }

    pub fn lint_section(&self, name: &str) -> Option<LintSection> {
        if is_runner_section(name) {
            return None;
        }
        self.document.section(name).map(LintSection::from_section)
    }
}

fn is_runner_section(name: &str) -> bool {
    name == TOX_SECTION || name == BASE_ENV_SECTION || name.starts_with(ENV_SECTION_PREFIX)
}

fn parse_tox_section(doc: &IniDocument) -> Result<ToxSection, ManifestError> {
    let Some(section) = doc.section(TOX_SECTION) else {
        return Ok(ToxSection::default());
    };
    let raw = |key: &str| -> Result<Option<String>, ManifestError> {
        section
            .get(key)
            .map(|v| expand_section_refs(v, doc))
            .transpose()
    };

    let envlist = raw("envlist")?
        .map(|v| expand_env_list(&v).into_iter().map(EnvName::new).collect())
        .unwrap_or_default();
    let minversion = raw("minversion")?
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());
    let skipsdist = match raw("skipsdist")? {
        Some(v) => parse_bool(TOX_SECTION, "skipsdist", &v)?,
        None => false,
    };
    let skip_missing_interpreters = match raw("skip_missing_interpreters")? {
        Some(v) => parse_bool(TOX_SECTION, "skip_missing_interpreters", &v)?,
        None => false,
    };
    let toxworkdir = raw("toxworkdir")?
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(default_toxworkdir);

    Ok(ToxSection {
        envlist,
        minversion,
        skipsdist,
        toxworkdir,
        skip_missing_interpreters,
    })
}

pub fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ManifestError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ManifestError::InvalidBool {
            section: section.to_owned(),
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

pub fn parse_manifest_str(
    input: &str,
    toxinidir: impl Into<PathBuf>,
) -> Result<Manifest, ManifestError> {
    Manifest::from_document(parse_ini(input)?, toxinidir)
}

/// Parse a manifest file; its (absolute) parent directory becomes `toxinidir`.
pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let toxinidir = absolute
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    parse_manifest_str(&content, toxinidir)
}
