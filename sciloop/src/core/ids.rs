//! Monotonic id sequences owned by individual agents.

use std::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe counter yielding 1, 2, 3, ...
#[derive(Debug, Default)]
pub struct IdSequence {
    next: AtomicU32,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next sequence number.
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Letter suffix for the n-th (0-based) candidate: A, B, ..., Z, AA, AB, ...
pub fn letter_suffix(index: usize) -> String {
    let mut n = index;
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
