//! Property tests for window comparison.

use core_diff::{DiffCount, DiffScan, DifferenceEngine, compare_windows};
use core_session::FileSession;
use proptest::prelude::*;
use std::io::Write;

fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

fn pair(max: usize) -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (1..max).prop_flat_map(|len| {
        (
            proptest::collection::vec(0u8..4, len),
            proptest::collection::vec(0u8..4, len),
        )
    })
}

proptest! {
    // Marked positions are exactly the differing ones, whichever side is first.
    #[test]
    fn compute_is_symmetric_and_exact((a, b) in pair(256)) {
        let (fa, fb) = (fixture(&a), fixture(&b));
        let sa = FileSession::open(fa.path(), a.len(), 16).unwrap();
        let sb = FileSession::open(fb.path(), b.len(), 16).unwrap();
        let mut engine = DifferenceEngine::new(4096);

        let ab = engine.compute(&sa, &sb, DiffScan::Refresh);
        let flags_ab = engine.map().flags().to_vec();
        let ba = engine.compute(&sb, &sa, DiffScan::Refresh);
        let flags_ba = engine.map().flags().to_vec();

        let expected: Vec<bool> = a.iter().zip(&b).map(|(x, y)| x != y).collect();
        prop_assert_eq!(&flags_ab, &expected);
        prop_assert_eq!(&flags_ba, &expected);
        prop_assert_eq!(ab, ba);
        let n = expected.iter().filter(|f| **f).count();
        if n > 0 {
            prop_assert_eq!(ab, DiffCount::Different(n));
        } else {
            prop_assert_eq!(ab, DiffCount::Identical);
        }
    }

    // Unequal lengths: the excess counts as differing.
    #[test]
    fn excess_bytes_always_count(a in proptest::collection::vec(any::<u8>(), 0..64),
                                 extra in proptest::collection::vec(any::<u8>(), 1..16)) {
        let mut b = a.clone();
        b.extend_from_slice(&extra);
        let mut flags = vec![false; b.len()];
        let n = compare_windows(&a, &b, &mut flags);
        prop_assert_eq!(n, extra.len());
        prop_assert!(flags[a.len()..].iter().all(|f| *f));
    }
}
