//! `{...}` substitution.
//!
//! Substitution runs in two phases. [`expand_section_refs`] runs while resolving an
//! environment and only replaces `{[section]key}` references with the raw value
//! they point to. [`substitute`] runs once the isolated context exists and replaces
//! everything else: context variables (`{envdir}`, `{toxinidir}`, ...), `{posargs}`,
//! `{env:NAME}` and `{:}`.
//!
//! Braces whose content is not a token (`{'a': 1}`) are copied literally, and `\{`
//! / `\}` escape a brace. Escapes survive the first phase and are removed by the
//! second.

use crate::cmdline::quote_if_needed;
use crate::ini::IniDocument;
use crate::manifest::ManifestError;
use std::collections::BTreeMap;

/// Values available to the second substitution phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstContext {
    /// Plain `{name}` variables, e.g. `envdir` -> `/src/.tox/py27`.
    pub vars: BTreeMap<String, String>,
    /// Positional arguments passed through from the command line.
    pub posargs: Vec<String>,
    /// Lookup table for `{env:NAME}`: `setenv` values layered over the host environment.
    pub environ: BTreeMap<String, String>,
}

impl SubstContext {
    #[must_use]
    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_owned(), value.into());
        self
    }
}

enum Token<'a> {
    SectionRef { section: &'a str, key: &'a str },
    Posargs(Option<&'a str>),
    Env { name: &'a str, default: Option<&'a str> },
    PathSep,
    Var(&'a str),
}

fn classify(content: &str) -> Option<Token<'_>> {
    if content == ":" {
        return Some(Token::PathSep);
    }
    if let Some(rest) = content.strip_prefix('[') {
        let (section, key) = rest.split_once(']')?;
        let key_ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_-.".contains(c));
        return key_ok.then_some(Token::SectionRef { section, key });
    }
    if content == "posargs" {
        return Some(Token::Posargs(None));
    }
    if let Some(default) = content.strip_prefix("posargs:") {
        return Some(Token::Posargs(Some(default)));
    }
    if let Some(rest) = content.strip_prefix("env:") {
        let (name, default) = match rest.split_once(':') {
            Some((n, d)) => (n, Some(d)),
            None => (rest, None),
        };
        return (!name.is_empty()).then_some(Token::Env { name, default });
    }
    is_identifier(content).then_some(Token::Var(content))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Index of the `}` closing the `{` at `open`, honouring nesting and escapes.
fn matching_brace(value: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in value[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn walk<F>(value: &str, keep_escapes: bool, handle: &mut F) -> Result<String, ManifestError>
where
    F: FnMut(&str, &mut String) -> Result<(), ManifestError>,
{
    let mut out = String::with_capacity(value.len());
    let mut chars = value.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some((_, '{' | '}'))) => {
                if keep_escapes {
                    out.push('\\');
                }
                if let Some((_, brace)) = chars.next() {
                    out.push(brace);
                }
            }
            '{' => match matching_brace(value, i) {
                Some(end) => {
                    handle(&value[i + 1..end], &mut out)?;
                    while chars.next_if(|&(j, _)| j <= end).is_some() {}
                }
                None => out.push('{'),
            },
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Replace `{[section]key}` references with the referenced raw values.
///
/// References are followed recursively; a cycle is an error. Every other token
/// is left for [`substitute`].
pub fn expand_section_refs(value: &str, doc: &IniDocument) -> Result<String, ManifestError> {
    let mut stack = Vec::new();
    expand_refs_inner(value, doc, &mut stack)
}

fn expand_refs_inner(
    value: &str,
    doc: &IniDocument,
    stack: &mut Vec<(String, String)>,
) -> Result<String, ManifestError> {
    walk(value, true, &mut |content, out| {
        if let Some(Token::SectionRef { section, key }) = classify(content) {
            let frame = (section.to_owned(), key.to_owned());
            if stack.contains(&frame) {
                return Err(ManifestError::CircularReference {
                    section: frame.0,
                    key: frame.1,
                });
            }
            let raw = doc
                .get(section, key)
                .ok_or_else(|| ManifestError::MissingReference {
                    section: section.to_owned(),
                    key: key.to_owned(),
                })?;
            stack.push(frame);
            let expanded = expand_refs_inner(raw, doc, stack);
            stack.pop();
            out.push_str(&expanded?);
        } else {
            out.push('{');
            out.push_str(&expand_refs_inner(content, doc, stack)?);
            out.push('}');
        }
        Ok(())
    })
}

/// Shell quote left open at the end of `text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

fn open_quote(text: &str) -> Quote {
    let mut state = Quote::None;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        state = match (state, c) {
            (Quote::None | Quote::Double, '\\') => {
                escaped = true;
                state
            }
            (Quote::None, '\'') => Quote::Single,
            (Quote::None, '"') => Quote::Double,
            (Quote::Single, '\'') | (Quote::Double, '"') => Quote::None,
            _ => state,
        };
    }
    state
}

/// Posargs joined so that each one survives word splitting as written: inside
/// an open quote they become part of that quoted word, outside each is quoted
/// on its own.
fn quote_posargs(posargs: &[String], quote: Quote) -> String {
    match quote {
        Quote::None => posargs
            .iter()
            .map(|a| quote_if_needed(a))
            .collect::<Vec<_>>()
            .join(" "),
        Quote::Single => posargs.join(" ").replace('\'', "'\\''"),
        Quote::Double => posargs
            .join(" ")
            .chars()
            .fold(String::new(), |mut acc, c| {
                if matches!(c, '"' | '\\' | '$' | '`') {
                    acc.push('\\');
                }
                acc.push(c);
                acc
            }),
    }
}

/// Replace runtime tokens in `value` using `ctx`.
pub fn substitute(value: &str, ctx: &SubstContext) -> Result<String, ManifestError> {
    walk(value, false, &mut |content, out| {
        match classify(content) {
            Some(Token::Var(name)) => {
                let v = ctx
                    .vars
                    .get(name)
                    .ok_or_else(|| ManifestError::UnknownSubstitution(name.to_owned()))?;
                out.push_str(v);
            }
            Some(Token::Posargs(default)) => {
                if ctx.posargs.is_empty() {
                    if let Some(d) = default {
                        out.push_str(&substitute(d, ctx)?);
                    }
                } else {
                    let quoted = quote_posargs(&ctx.posargs, open_quote(out));
                    out.push_str(&quoted);
                }
            }
            Some(Token::Env { name, default }) => match (ctx.environ.get(name), default) {
                (Some(v), _) => out.push_str(v),
                (None, Some(d)) => out.push_str(&substitute(d, ctx)?),
                (None, None) => return Err(ManifestError::MissingEnvVar(name.to_owned())),
            },
            Some(Token::PathSep) => out.push(if cfg!(windows) { ';' } else { ':' }),
            Some(Token::SectionRef { .. }) => {
                out.push('{');
                out.push_str(content);
                out.push('}');
            }
            None => {
                out.push('{');
                out.push_str(&substitute(content, ctx)?);
                out.push('}');
            }
        }
        Ok(())
    })
}
