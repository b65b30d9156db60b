//! Generative envlists (`py{27,34}-unit`) and factor-conditional values (`py27: mock`).

/// Split an `envlist` value into environment names.
///
/// Entries are separated by commas or newlines; commas inside `{...}` belong to the
/// brace group. Every entry is brace-expanded. Duplicates keep their first position.
pub fn expand_env_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in split_top_level(raw) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        for name in expand_braces(item) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

/// Expand every `{a,b}` group into the product of its alternatives.
///
/// Groups do not nest; an unmatched `{` is kept literally.
pub fn expand_braces(s: &str) -> Vec<String> {
    let Some(open) = s.find('{') else {
        return vec![s.to_owned()];
    };
    let Some(close_rel) = s[open..].find('}') else {
        return vec![s.to_owned()];
    };
    let close = open + close_rel;
    let prefix = &s[..open];
    let body = &s[open + 1..close];
    let suffixes = expand_braces(&s[close + 1..]);

    let mut out = Vec::new();
    for alt in body.split(',') {
        let alt = alt.trim();
        for suffix in &suffixes {
            out.push(format!("{prefix}{alt}{suffix}"));
        }
    }
    out
}

pub fn env_factors(name: &str) -> Vec<&str> {
    name.split('-').filter(|f| !f.is_empty()).collect()
}

/// Keep only the lines of a multi-line value that apply to `env_name`.
///
/// A line `cond: rest` (colon followed by whitespace) applies when any
/// comma-separated alternative of `cond` matches. An alternative is a `-`-joined
/// list of factors that must all be present; a `!factor` must be absent. Lines
/// without a condition always apply.
pub fn filter_factor_conditions(value: &str, env_name: &str) -> String {
    let factors = env_factors(env_name);
    let mut kept = Vec::new();
    for line in value.lines() {
        match split_condition(line) {
            Some((cond, rest)) => {
                if condition_matches(cond, &factors) {
                    kept.push(rest);
                }
            }
            None => kept.push(line),
        }
    }
    kept.join("\n")
}

fn split_condition(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let colon = trimmed.find(':')?;
    let cond = &trimmed[..colon];
    let after = &trimmed[colon + 1..];
    if cond.is_empty() || !after.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }
    let valid = cond
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_.!,{}-".contains(c));
    if !valid {
        return None;
    }
    let rest = after.trim();
    if rest.is_empty() {
        return None;
    }
    Some((cond, rest))
}

fn condition_matches(cond: &str, factors: &[&str]) -> bool {
    expand_braces(cond)
        .iter()
        .flat_map(|c| c.split(',').map(str::to_owned).collect::<Vec<_>>())
        .any(|alt| {
            let alt = alt.trim();
            !alt.is_empty()
                && alt.split('-').filter(|f| !f.is_empty()).all(|f| {
                    if let Some(negated) = f.strip_prefix('!') {
                        !factors.contains(&negated)
                    } else {
                        factors.contains(&f)
                    }
                })
        })
}

fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' | '\n' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}
