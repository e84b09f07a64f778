//! Output verification against golden words

/// One output word that differs from its golden value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Word index in the output buffer
    pub index: usize,
    /// Golden value
    pub expected: u32,
    /// Value read back; `None` if the output was shorter than the golden set
    pub actual: Option<u32>,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.actual {
            Some(actual) => write!(
                f,
                "word {}: expected {:#010x}, got {actual:#010x}",
                self.index, self.expected
            ),
            None => write!(f, "word {}: expected {:#010x}, missing", self.index, self.expected),
        }
    }
}

/// Result of comparing an output buffer with its golden values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    /// Words checked
    pub checked: usize,
    /// Every mismatching word
    pub mismatches: Vec<Mismatch>,
}

impl Verification {
    /// Number of mismatching words
    pub fn error_count(&self) -> usize {
        self.mismatches.len()
    }

    /// True if every word matched
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare `actual` against `expected` word by word
///
/// Each mismatch is counted once; a missing word counts as a mismatch.
/// Extra output words beyond the golden set are not checked.
pub fn verify_words(actual: &[u32], expected: &[u32]) -> Verification {
    let mismatches: Vec<_> = expected
        .iter()
        .enumerate()
        .filter_map(|(index, &expected)| {
            let actual = actual.get(index).copied();
            (actual != Some(expected)).then_some(Mismatch {
                index,
                expected,
                actual,
            })
        })
        .collect();

    for m in &mismatches {
        tracing::warn!("Verification mismatch, {m}");
    }

    Verification {
        checked: expected.len(),
        mismatches,
    }
}
