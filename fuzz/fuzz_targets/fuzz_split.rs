#![no_main]

//! Arbitrary documents and limits through the line splitter.
//!
//! Any Unicode input must either fail with a `SplitError` or produce parts
//! that fit the limit and concatenate back to the input.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ticketbox::splitter::{byte_len, split};

#[derive(Arbitrary, Debug)]
struct SplitInput {
    document: String,
    limit: u16,
}

fuzz_target!(|input: SplitInput| {
    let limit = input.limit as usize;
    let Ok(parts) = split(&input.document, limit) else {
        return;
    };

    let mut rebuilt = String::with_capacity(input.document.len());
    for part in &parts {
        assert!(!part.is_empty());
        assert!(byte_len(part) <= limit);
        rebuilt.push_str(part);
    }
    assert_eq!(rebuilt, input.document);
});
