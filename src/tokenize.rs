//! Raw-argument tokenizer.
//!
//! Splits the free-form argument string into discrete tokens: whitespace
//! separates tokens, and `"` and `'` each open a quoted run that may contain
//! any character (including the other quote character) up to its matching
//! close quote. Dashes, dots, and digits are ordinary word characters so
//! flags like `--executor-cores` and bare numbers survive intact.
//!
//! This is a real quote-tracking scanner, not a whitespace split: submitted
//! jobs routinely take file paths and SQL fragments with embedded spaces.

use crate::error::SubmitError;

/// Tokenize `raw` into argument strings.
///
/// Empty or whitespace-only input yields an empty vector. A quote character
/// terminates any in-progress bare word; the quoted run is its own token,
/// even when empty (`""` produces one empty token). An unterminated quote
/// is an error carrying the quote character and its byte offset.
pub fn tokenize(raw: &str) -> Result<Vec<String>, SubmitError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;

    let mut chars = raw.char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '"' | '\'' => {
                if in_word {
                    tokens.push(std::mem::take(&mut current));
                    in_word = false;
                }
                let mut closed = false;
                for (_, qc) in chars.by_ref() {
                    if qc == c {
                        closed = true;
                        break;
                    }
                    current.push(qc);
                }
                if !closed {
                    return Err(SubmitError::UnterminatedQuote { quote: c, offset });
                }
                tokens.push(std::mem::take(&mut current));
            }
            c if c.is_whitespace() => {
                if in_word {
                    tokens.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        tokens.push(current);
    }

    Ok(tokens)
}
