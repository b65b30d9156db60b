//! Manifest parsing, envlist expansion, substitution, and environment resolution for toxide.
//!
//! This crate defines the schema layer: the INI reader (`IniDocument`), the typed
//! manifest view (`Manifest`, `ToxSection`, `LintSection`), generative envlists and
//! factor-conditional values, the two-phase `{...}` substitution engine, the
//! layered `resolve` that folds `[tox]` / `[testenv]` / `[testenv:NAME]` into an
//! `EnvConfig`, and the install fingerprint used to decide context reuse.

pub mod cmdline;
pub mod envlist;
pub mod identity;
pub mod ini;
pub mod lint;
pub mod manifest;
pub mod resolve;
pub mod subst;
pub mod types;

pub use cmdline::{quote_if_needed, shell_quote, split_command_line};
pub use envlist::{env_factors, expand_env_list, filter_factor_conditions};
pub use identity::compute_fingerprint;
pub use ini::{parse_ini, IniDocument, IniSection};
pub use lint::LintSection;
pub use manifest::{
    parse_bool, parse_manifest_file, parse_manifest_str, Manifest, ManifestError, ToxSection,
    BASE_ENV_SECTION, ENV_SECTION_PREFIX, TOX_SECTION,
};
pub use resolve::{default_basepython, resolve, EnvConfig, DEFAULT_INSTALL_COMMAND, ENV_KEYS};
pub use subst::{expand_section_refs, substitute, SubstContext};
pub use types::{EnvName, Fingerprint};
