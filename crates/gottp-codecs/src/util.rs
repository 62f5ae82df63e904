// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared helpers: a POSIX-shell-rules tokenizer/quoter for the cURL codec,
//! and small `serde_json::Value` accessors used by the JSON-based codecs.

use serde_json::Value;

/// Split a command line into shell words, honoring POSIX quoting: single
/// quotes are fully literal, double quotes allow `\"`, `\\`, `\$`, and `` \` ``
/// escapes, and an unquoted backslash escapes the following character.
/// `\`-newline line continuations are joined before tokenizing.
pub fn shell_split(command: &str) -> Vec<String> {
    let joined = command.replace("\\\n", " ");
    let mut words = Vec::new();
    let mut current = String::new();
    let mut has_current = false;
    let mut chars = joined.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if has_current {
                    words.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            '\'' => {
                has_current = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    current.push(c);
                }
            }
            '"' => {
                has_current = true;
                while let Some(c) = chars.next() {
                    if c == '"' {
                        break;
                    }
                    if c == '\\' {
                        match chars.peek() {
                            Some('"') | Some('\\') | Some('$') | Some('`') => {
                                current.push(chars.next().unwrap());
                            }
                            _ => current.push('\\'),
                        }
                    } else {
                        current.push(c);
                    }
                }
            }
            '\\' => {
                has_current = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c => {
                has_current = true;
                current.push(c);
            }
        }
    }
    if has_current {
        words.push(current);
    }
    words
}

/// Single-quote `value` for safe reuse on a POSIX shell command line,
/// escaping embedded single quotes as `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// `value.get(key).and_then(Value::as_str)`, spelled once.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// `value.get(key).and_then(Value::as_array)`, spelled once.
pub fn array_field<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    value.get(key).and_then(Value::as_array)
}
