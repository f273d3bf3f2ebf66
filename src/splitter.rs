//! Byte-bounded chunking of transcripts.
//!
//! [`split`] cuts a document into ordered parts whose UTF-8 size never
//! exceeds the limit. Lines are kept whole whenever they fit; a line that is
//! larger than the limit is cut at character boundaries found by binary
//! search. [`split_with_headers`] is the export-time variant that prefixes
//! every part with a header and still honours the same limit.

use std::fmt;
use std::mem;

use crate::error::SplitError;

/// Encoded size of `s` in bytes.
pub fn byte_len(s: &str) -> usize {
    s.len()
}

/// The first `chars` characters of `s` (all of `s` if it is shorter).
pub fn char_prefix(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((at, _)) => &s[..at],
        None => s,
    }
}

/// Largest character count whose prefix fits in `limit` bytes.
fn max_prefix_chars(s: &str, limit: usize) -> usize {
    let (mut lo, mut hi) = (0usize, s.chars().count());
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if byte_len(char_prefix(s, mid)) <= limit {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

pub fn split(document: &str, limit: usize) -> Result<Vec<String>, SplitError> {
    if limit == 0 {
        return Err(SplitError::ZeroLimit);
    }

    let mut parts = Vec::new();
    let mut buf = String::new();

    for line in document.split_inclusive('\n') {
        let len = byte_len(line);

        if len > limit {
            if !buf.is_empty() {
                parts.push(mem::take(&mut buf));
            }
            let mut rest = line;
            while byte_len(rest) > limit {
                let chars = max_prefix_chars(rest, limit);
                if chars == 0 {
                    let ch = rest.chars().next().unwrap_or_default();
                    return Err(SplitError::CharTooWide {
                        ch,
                        width: ch.len_utf8(),
                        limit,
                    });
                }
                let head = char_prefix(rest, chars);
                parts.push(head.to_string());
                rest = &rest[head.len()..];
            }
            buf.push_str(rest);
        } else if byte_len(&buf) + len <= limit {
            buf.push_str(line);
        } else {
            parts.push(mem::take(&mut buf));
            buf.push_str(line);
        }
    }

    if !buf.is_empty() {
        parts.push(buf);
    }
    Ok(parts)
}

/// 1-based position of a delivered part; `sub` is set when a part had to be
/// re-split to make room for its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLabel {
    pub index: usize,
    pub sub: Option<usize>,
}

impl PartLabel {
    pub fn top(index: usize) -> Self {
        Self { index, sub: None }
    }

    pub fn sub(index: usize, sub: usize) -> Self {
        Self {
            index,
            sub: Some(sub),
        }
    }
}

impl fmt::Display for PartLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{}", self.index, sub),
            None => write!(f, "{}", self.index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledPart {
    pub label: PartLabel,
    pub header: String,
    pub body: String,
}

impl LabeledPart {
    pub fn byte_len(&self) -> usize {
        byte_len(&self.header) + byte_len(&self.body)
    }

    pub fn into_string(self) -> String {
        let mut out = self.header;
        out.push_str(&self.body);
        out
    }
}

/// Split `document` and prefix each part with `header(label, total)`, where
/// `total` is the number of top-level parts. A part that no longer fits once
/// its header is added is re-split into `i.1`, `i.2`, ... sub-parts.
pub fn split_with_headers<F>(
    document: &str,
    limit: usize,
    header: F,
) -> Result<Vec<LabeledPart>, SplitError>
where
    F: Fn(&PartLabel, usize) -> String,
{
    let parts = split(document, limit)?;
    let total = parts.len();
    let mut out = Vec::with_capacity(total);

    for (i, body) in parts.into_iter().enumerate() {
        let label = PartLabel::top(i + 1);
        let head = header(&label, total);
        if byte_len(&head) + byte_len(&body) <= limit {
            out.push(LabeledPart {
                label,
                header: head,
                body,
            });
        } else {
            out.extend(resplit(&body, limit, i + 1, total, &header)?);
        }
    }

    Ok(out)
}

fn resplit<F>(
    body: &str,
    limit: usize,
    index: usize,
    total: usize,
    header: &F,
) -> Result<Vec<LabeledPart>, SplitError>
where
    F: Fn(&PartLabel, usize) -> String,
{
    // Sub-labels grow with the sub-part count, so iterate until the reserved
    // header width covers every header actually produced.
    let mut reserved = byte_len(&header(&PartLabel::sub(index, 1), total));
    loop {
        let budget = limit
            .checked_sub(reserved)
            .filter(|budget| *budget > 0)
            .ok_or(SplitError::HeaderTooWide {
                header: reserved,
                limit,
            })?;

        let pieces = split(body, budget)?;
        let headers: Vec<String> = (1..=pieces.len())
            .map(|sub| header(&PartLabel::sub(index, sub), total))
            .collect();
        let widest = headers.iter().map(|h| byte_len(h)).max().unwrap_or(0);

        if widest <= reserved {
            return Ok(pieces
                .into_iter()
                .zip(headers)
                .enumerate()
                .map(|(sub, (body, header))| LabeledPart {
                    label: PartLabel::sub(index, sub + 1),
                    header,
                    body,
                })
                .collect());
        }
        reserved = widest;
    }
}
