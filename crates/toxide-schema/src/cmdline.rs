//! POSIX-shell-like quoting and word splitting for command lines.
//!
//! Command lines from the manifest are never handed to a shell; they are split
//! into an argv here and executed directly.

use crate::manifest::ManifestError;

pub fn shell_quote(s: &str) -> String {
    // Single-quoting in POSIX shell: replace ' with '\'' then wrap in '
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quote `s` only when splitting would otherwise change it.
pub fn quote_if_needed(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%^".contains(c));
    if safe {
        s.to_owned()
    } else {
        shell_quote(s)
    }
}

/// Split a command line into words.
///
/// Single quotes preserve everything literally, double quotes allow `\"`, `\\`,
/// `\$` and `` \` `` escapes, and an unquoted backslash escapes the next
/// character. An empty quoted string produces an empty word.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ManifestError> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => word.push(ch),
                        None => return Err(invalid(line, "unterminated single quote")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => word.push(ch),
                            Some(ch) => {
                                word.push('\\');
                                word.push(ch);
                            }
                            None => return Err(invalid(line, "unterminated double quote")),
                        },
                        Some(ch) => word.push(ch),
                        None => return Err(invalid(line, "unterminated double quote")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => word.push(ch),
                    None => return Err(invalid(line, "trailing backslash")),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

fn invalid(command: &str, reason: &str) -> ManifestError {
    ManifestError::InvalidCommand {
        command: command.to_owned(),
        reason: reason.to_owned(),
    }
}
