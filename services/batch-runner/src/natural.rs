//! Natural ordering for names with embedded numbers
//!
//! `block2.txt` sorts before `block10.txt`, and `GEMINI_API_KEY2` before
//! `GEMINI_API_KEY10`. Text runs compare case-insensitively, digit runs by
//! numeric value.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Text(String),
    /// Digits with leading zeros stripped, ordered by length then value
    Number(usize, String),
}

fn key(name: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    for c in name.chars() {
        let digit = c.is_ascii_digit();
        if digit != in_digits {
            chunks.push(chunk(std::mem::take(&mut current), in_digits));
            in_digits = digit;
        }
        current.push(c);
    }
    chunks.push(chunk(current, in_digits));
    chunks
}

fn chunk(run: String, digits: bool) -> Chunk {
    if digits {
        let trimmed = run.trim_start_matches('0').to_string();
        Chunk::Number(trimmed.len(), trimmed)
    } else {
        Chunk::Text(run.to_lowercase())
    }
}

/// Compare two names in natural order.
pub fn compare(a: &str, b: &str) -> Ordering {
    key(a).cmp(&key(b))
}
