//! Whole-file search agrees with a naive scan, whatever the chunk size.

use core_events::{CancelAfter, Direction, NeverCancel};
use core_search::{PatternSearchEngine, SearchCursor, SearchOutcome, SearchSettings};
use core_session::FileSession;
use proptest::prelude::*;
use std::io::Write;

fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

fn engine(chunk: usize) -> PatternSearchEngine {
    PatternSearchEngine::new(SearchSettings {
        forward_chunk: chunk,
        backward_chunk: chunk,
        lead_in: 0,
    })
}

fn occurrences(hay: &[u8], pat: &[u8]) -> Vec<u64> {
    if hay.len() < pat.len() {
        return Vec::new();
    }
    (0..=hay.len() - pat.len())
        .filter(|&i| &hay[i..i + pat.len()] == pat)
        .map(|i| i as u64)
        .collect()
}

fn collect(
    engine: &mut PatternSearchEngine,
    session: &mut FileSession,
    cursor: &mut SearchCursor,
    direction: Direction,
) -> Vec<u64> {
    let mut hits = Vec::new();
    while let SearchOutcome::Found(at) = engine.find(session, cursor, direction, &NeverCancel) {
        hits.push(at);
    }
    hits
}

fn input() -> impl Strategy<Value = (Vec<u8>, Vec<u8>, usize)> {
    (
        proptest::collection::vec(0u8..3, 1..600),
        proptest::collection::vec(0u8..3, 1..6),
        1usize..40,
    )
}

proptest! {
    #[test]
    fn forward_repeats_visit_every_match_in_order((hay, pat, chunk) in input()) {
        let f = fixture(&hay);
        let mut s = FileSession::open(f.path(), 32, 16).unwrap();
        let mut cursor = SearchCursor::new(pat.clone(), false);
        let hits = collect(&mut engine(chunk), &mut s, &mut cursor, Direction::Forward);
        prop_assert_eq!(hits, occurrences(&hay, &pat));
    }

    #[test]
    fn backward_repeats_visit_every_match_in_reverse((hay, pat, chunk) in input()) {
        let f = fixture(&hay);
        let mut s = FileSession::open(f.path(), 32, 16).unwrap();
        s.move_to(s.filesize());
        let mut cursor = SearchCursor::new(pat.clone(), false);
        let hits = collect(&mut engine(chunk), &mut s, &mut cursor, Direction::Backward);
        let mut expected = occurrences(&hay, &pat);
        expected.reverse();
        prop_assert_eq!(hits, expected);
        prop_assert_eq!(s.offset(), 0);
    }

    // A cancelled search picks up where it stopped and reaches the same hit.
    #[test]
    fn cancel_then_resume_finds_same_match(
        (hay, pat, chunk) in input(),
        polls in 0u64..8,
        backward in any::<bool>(),
    ) {
        let direction = if backward { Direction::Backward } else { Direction::Forward };
        let f = fixture(&hay);
        let mut e = engine(chunk);

        let mut s = FileSession::open(f.path(), 32, 16).unwrap();
        if backward {
            s.move_to(s.filesize());
        }
        let mut plain = SearchCursor::new(pat.clone(), false);
        let expected = e.find(&mut s, &mut plain, direction, &NeverCancel);

        let mut s = FileSession::open(f.path(), 32, 16).unwrap();
        if backward {
            s.move_to(s.filesize());
        }
        let mut cursor = SearchCursor::new(pat.clone(), false);
        let mut outcome = e.find(&mut s, &mut cursor, direction, &CancelAfter::new(polls));
        if let SearchOutcome::Cancelled { at } = outcome {
            prop_assert_eq!(s.offset(), at);
            outcome = e.find(&mut s, &mut cursor, direction, &NeverCancel);
        }
        prop_assert_eq!(outcome, expected);
    }
}
