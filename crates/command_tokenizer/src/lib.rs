//! Quote- and escape-aware splitter used to turn raw command input into argument tokens.
//!
//! The splitter runs on every keystroke of interactive input and on every command execution, so
//! it makes a single pass over the input and only allocates per emitted token.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

use std::{iter::Peekable, str::Chars};

use serde::{Deserialize, Serialize};

/// Separator used for command lines.
pub const ARGUMENT_SEPARATOR: char = ' ';

/// Options controlling [`split_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SplitOptions {
    /// Keep the surrounding quote characters on quoted tokens.
    #[serde(default)]
    pub keep_quotes: bool,
    /// Maximum number of tokens. The last token absorbs the remaining input.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SplitOptions {
    /// Options that keep quote characters.
    pub fn keep_quotes() -> Self {
        Self {
            keep_quotes: true,
            limit: None,
        }
    }

    /// Options that cap the token count.
    pub fn limit(limit: usize) -> Self {
        Self {
            keep_quotes: false,
            limit: Some(limit),
        }
    }
}

/// Splits a command line on spaces with default options.
pub fn split_args(line: &str) -> Vec<String> {
    split_string(line, ARGUMENT_SEPARATOR, &SplitOptions::default())
}

/// Splits `text` on `separator`, honoring quotes and escapes.
///
/// Runs of the separator never produce empty tokens. A token starting with `'` or `"` opens a
/// quoted span that ends at the first matching, unescaped quote followed by a separator or the
/// end of input. Unterminated spans are flushed as the final token.
pub fn split_string(text: &str, separator: char, options: &SplitOptions) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quote = None::<char>;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            decode_escape(&mut chars, &mut current);
            started = true;
            continue;
        }

        if let Some(active) = quote {
            let at_boundary = chars.peek().map_or(true, |next| *next == separator);
            if ch == active && at_boundary {
                if options.keep_quotes {
                    current.push(ch);
                }
                quote = None;
            } else {
                current.push(ch);
            }
            continue;
        }

        if ch == separator {
            if started {
                if folding(options, tokens.len()) {
                    current.push(ch);
                } else {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            continue;
        }

        if !started && (ch == '"' || ch == '\'') {
            quote = Some(ch);
            started = true;
            if options.keep_quotes {
                current.push(ch);
            }
            continue;
        }

        current.push(ch);
        started = true;
    }

    if started {
        if quote.is_none() && folding(options, tokens.len()) {
            let trimmed = current.trim_end_matches(separator).len();
            current.truncate(trimmed);
        }
        tokens.push(current);
    }

    tokens
}

fn folding(options: &SplitOptions, emitted: usize) -> bool {
    options.limit.is_some_and(|limit| emitted + 1 >= limit)
}

fn decode_escape(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    let decoded = match chars.peek().copied() {
        Some('t') => Some('\t'),
        Some('n') => Some('\n'),
        Some(ch @ ('\\' | '\'' | '"')) => Some(ch),
        Some('x') => return decode_hex(chars, 2, out),
        Some('u') => return decode_hex(chars, 4, out),
        _ => None,
    };
    match decoded {
        Some(ch) => {
            chars.next();
            out.push(ch);
        }
        None => out.push('\\'),
    }
}

fn decode_hex(chars: &mut Peekable<Chars<'_>>, digits: usize, out: &mut String) {
    let mut probe = chars.clone();
    probe.next();
    let mut code = 0u32;
    for _ in 0..digits {
        match probe.next().and_then(|ch| ch.to_digit(16)) {
            Some(digit) => code = code * 16 + digit,
            None => {
                out.push('\\');
                return;
            }
        }
    }
    match char::from_u32(code) {
        Some(ch) => {
            *chars = probe;
            out.push(ch);
        }
        None => out.push('\\'),
    }
}
