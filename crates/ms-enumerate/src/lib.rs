#![forbid(unsafe_code)]

//! Weight-ordered enumeration of fixed-length tuples drawn from an ordered
//! element source.
//!
//! The weight of a tuple is the sum of the source indices of its entries.
//! Tuples are produced weight by weight; within one weight the index vectors
//! (compositions) follow descending lexicographic order, so
//! `[1, 0, 0]` precedes `[0, 1, 0]`.

use std::fmt;

/// Compositions of `weight` into `parts` non-negative parts, each at most
/// `max_part`, in descending lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compositions {
    parts: usize,
    max_part: usize,
    next: Option<Vec<usize>>,
}

impl Compositions {
    #[must_use]
    pub fn new(weight: usize, parts: usize, max_part: Option<usize>) -> Self {
        let max_part = max_part.unwrap_or(weight);
        let capacity = parts.checked_mul(max_part).unwrap_or(usize::MAX);
        let next = if weight > capacity {
            None
        } else {
            let mut first = vec![0; parts];
            fill_greedy(&mut first, weight, max_part);
            Some(first)
        };
        Self {
            parts,
            max_part,
            next,
        }
    }

    fn advance(&mut self, current: &[usize]) -> Option<Vec<usize>> {
        if self.parts < 2 {
            return None;
        }
        let mut suffix = 0usize;
        for idx in (0..self.parts - 1).rev() {
            suffix += current[idx + 1];
            let room = (self.parts - 1 - idx).saturating_mul(self.max_part);
            if current[idx] > 0 && suffix < room {
                let mut out = current.to_vec();
                out[idx] -= 1;
                fill_greedy(&mut out[idx + 1..], suffix + 1, self.max_part);
                return Some(out);
            }
        }
        None
    }
}

impl Iterator for Compositions {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = self.advance(&current);
        Some(current)
    }
}

fn fill_greedy(slots: &mut [usize], mut remaining: usize, max_part: usize) {
    for slot in slots.iter_mut() {
        let take = remaining.min(max_part);
        *slot = take;
        remaining -= take;
    }
}

/// Sum of the indices in `indices`, i.e. the weight of the tuple they select.
#[must_use]
pub fn weight_of(indices: &[usize]) -> usize {
    indices.iter().sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationPhase {
    Start,
    Emitting { weight: usize },
    Exhausted,
}

impl fmt::Display for EnumerationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Emitting { weight } => write!(f, "emitting weight={weight}"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Pull-based enumeration of every `slots`-tuple over an element source, in
/// ascending weight.
///
/// A finite source is read in full when the first tuple is requested, and the
/// last weight is `(len - 1) * slots`. With an unbounded source one more
/// element is pulled before each new weight, so weight `w` can index elements
/// `0..=w`. When
/// `slots == 0` a single empty tuple is produced.
pub struct WeightedTuples<I>
where
    I: Iterator,
{
    source: Option<I>,
    materialize: bool,
    elements: Vec<I::Item>,
    slots: usize,
    phase: EnumerationPhase,
    compositions: Option<Compositions>,
}

impl<I> WeightedTuples<I>
where
    I: Iterator,
    I::Item: Clone,
{
    /// Materializes `source` completely before the first non-empty tuple.
    /// With `slots == 0` the source is never read.
    pub fn finite(source: I, slots: usize) -> Self {
        Self {
            source: Some(source),
            materialize: true,
            elements: Vec::new(),
            slots,
            phase: EnumerationPhase::Start,
            compositions: None,
        }
    }

    /// Discovers elements of `source` lazily, one per weight.
    pub fn unbounded(source: I, slots: usize) -> Self {
        Self {
            source: Some(source),
            materialize: false,
            elements: Vec::new(),
            slots,
            phase: EnumerationPhase::Start,
            compositions: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> EnumerationPhase {
        self.phase
    }

    /// Elements discovered so far, in source order.
    #[must_use]
    pub fn discovered(&self) -> &[I::Item] {
        &self.elements
    }

    fn pull(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        match source.next() {
            Some(element) => {
                self.elements.push(element);
                true
            }
            None => {
                self.source = None;
                false
            }
        }
    }

    fn max_weight(&self) -> Option<usize> {
        if self.source.is_some() {
            return None;
        }
        let top = self.elements.len().checked_sub(1)?;
        Some(top.saturating_mul(self.slots))
    }

    fn open_weight(&mut self, weight: usize) -> bool {
        if weight > 0 && weight >= self.elements.len() {
            self.pull();
        }
        if self.elements.is_empty() {
            return false;
        }
        if let Some(max) = self.max_weight()
            && weight > max
        {
            return false;
        }
        let max_part = self.elements.len() - 1;
        self.compositions = Some(Compositions::new(weight, self.slots, Some(max_part)));
        self.phase = EnumerationPhase::Emitting { weight };
        true
    }

    fn build(&self, indices: &[usize]) -> Vec<I::Item> {
        indices
            .iter()
            .map(|&idx| self.elements[idx].clone())
            .collect()
    }
}

impl<I> Iterator for WeightedTuples<I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                EnumerationPhase::Exhausted => return None,
                EnumerationPhase::Start => {
                    if self.slots == 0 {
                        self.phase = EnumerationPhase::Exhausted;
                        return Some(Vec::new());
                    }
                    if self.materialize {
                        if let Some(source) = self.source.take() {
                            self.elements.extend(source);
                        }
                    } else if self.source.is_some() {
                        self.pull();
                    }
                    if !self.open_weight(0) {
                        self.phase = EnumerationPhase::Exhausted;
                    }
                }
                EnumerationPhase::Emitting { weight } => {
                    if let Some(indices) = self.compositions.as_mut().and_then(Iterator::next) {
                        return Some(self.build(&indices));
                    }
                    let opened = weight
                        .checked_add(1)
                        .is_some_and(|next| self.open_weight(next));
                    if !opened {
                        self.compositions = None;
                        self.phase = EnumerationPhase::Exhausted;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use proptest::prelude::*;

    use super::{Compositions, EnumerationPhase, WeightedTuples, weight_of};

    fn det_seed(parts: &[usize]) -> u64 {
        let mut hash = 0xcbf2_9ce4_8422_2325u64;
        for value in parts {
            for byte in value.to_le_bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
        }
        hash
    }

    fn build_property_log(
        test_id: &str,
        seed: u64,
        output_digest: u64,
        reason_code: &str,
    ) -> BTreeMap<String, String> {
        let mut log = BTreeMap::new();
        log.insert("suite_id".to_string(), "ms_enumerate_property".to_string());
        log.insert("test_id".to_string(), test_id.to_string());
        log.insert("seed".to_string(), seed.to_string());
        log.insert(
            "output_digest".to_string(),
            format!("det64:{output_digest:016x}"),
        );
        log.insert(
            "replay_command".to_string(),
            format!("cargo test -p ms-enumerate {test_id} -- --nocapture"),
        );
        log.insert("outcome".to_string(), "pass".to_string());
        log.insert("reason_code".to_string(), reason_code.to_string());
        log
    }

    fn assert_log_contract(log: &BTreeMap<String, String>) {
        for key in [
            "suite_id",
            "test_id",
            "seed",
            "output_digest",
            "replay_command",
            "outcome",
            "reason_code",
        ] {
            assert!(
                log.contains_key(key),
                "property log missing required key '{key}'"
            );
        }
    }

    #[test]
    fn compositions_follow_descending_lex_order() {
        let got: Vec<Vec<usize>> = Compositions::new(2, 4, Some(1)).collect();
        assert_eq!(
            got,
            vec![
                vec![1, 1, 0, 0],
                vec![1, 0, 1, 0],
                vec![1, 0, 0, 1],
                vec![0, 1, 1, 0],
                vec![0, 1, 0, 1],
                vec![0, 0, 1, 1],
            ]
        );
    }

    #[test]
    fn unbounded_compositions_start_with_everything_in_front() {
        let got: Vec<Vec<usize>> = Compositions::new(2, 2, None).collect();
        assert_eq!(got, vec![vec![2, 0], vec![1, 1], vec![0, 2]]);
    }

    #[test]
    fn compositions_respect_capacity() {
        assert_eq!(Compositions::new(5, 2, Some(2)).count(), 0);
        assert_eq!(
            Compositions::new(4, 2, Some(2)).collect::<Vec<_>>(),
            vec![vec![2, 2]]
        );
        assert_eq!(
            Compositions::new(0, 3, Some(0)).collect::<Vec<_>>(),
            vec![vec![0, 0, 0]]
        );
        assert_eq!(
            Compositions::new(3, 1, None).collect::<Vec<_>>(),
            vec![vec![3]]
        );
    }

    #[test]
    fn compositions_of_zero_parts() {
        assert_eq!(
            Compositions::new(0, 0, None).collect::<Vec<_>>(),
            vec![Vec::<usize>::new()]
        );
        assert_eq!(Compositions::new(1, 0, None).count(), 0);
    }

    #[test]
    fn finite_two_element_source_yields_sixteen_quads() {
        let tuples: Vec<Vec<u8>> = WeightedTuples::finite([0u8, 1].into_iter(), 4).collect();
        assert_eq!(tuples.len(), 16);
        assert_eq!(tuples[0], vec![0, 0, 0, 0]);
        assert_eq!(tuples[1], vec![1, 0, 0, 0]);
        assert_eq!(tuples[4], vec![0, 0, 0, 1]);
        assert_eq!(tuples[5], vec![1, 1, 0, 0]);
        assert_eq!(tuples[15], vec![1, 1, 1, 1]);
        let unique: BTreeSet<_> = tuples.iter().cloned().collect();
        assert_eq!(unique.len(), 16);
    }

    #[test]
    fn zero_slots_yield_single_empty_tuple() {
        let mut finite = WeightedTuples::finite([0u8, 1].into_iter(), 0);
        assert_eq!(finite.next(), Some(Vec::new()));
        assert_eq!(finite.next(), None);
        assert_eq!(finite.phase(), EnumerationPhase::Exhausted);

        let mut unbounded = WeightedTuples::unbounded(0u64.., 0);
        assert_eq!(unbounded.next(), Some(Vec::new()));
        assert_eq!(unbounded.next(), None);
    }

    #[test]
    fn zero_slots_never_read_the_source() {
        let untouched = (0u64..).map(|_| -> u64 { panic!("source must stay unread") });
        let mut finite = WeightedTuples::finite(untouched, 0);
        assert_eq!(finite.next(), Some(Vec::new()));
        assert_eq!(finite.next(), None);
        assert!(finite.discovered().is_empty());
    }

    #[test]
    fn empty_source_yields_nothing() {
        let mut tuples = WeightedTuples::finite(std::iter::empty::<u8>(), 2);
        assert_eq!(tuples.next(), None);
        let mut tuples = WeightedTuples::unbounded(std::iter::empty::<u8>(), 2);
        assert_eq!(tuples.next(), None);
    }

    #[test]
    fn unbounded_source_discovers_one_element_per_weight() {
        let integers = (0i64..).map(|k| if k % 2 == 0 { -(k / 2) } else { k / 2 + 1 });
        let mut tuples = WeightedTuples::unbounded(integers, 2);
        assert_eq!(tuples.next(), Some(vec![0, 0]));
        assert_eq!(tuples.discovered().len(), 1);
        assert_eq!(tuples.next(), Some(vec![1, 0]));
        assert_eq!(tuples.next(), Some(vec![0, 1]));
        assert_eq!(tuples.discovered().len(), 2);
        assert_eq!(tuples.next(), Some(vec![-1, 0]));
        assert_eq!(tuples.next(), Some(vec![1, 1]));
        assert_eq!(tuples.next(), Some(vec![0, -1]));
        assert_eq!(tuples.phase(), EnumerationPhase::Emitting { weight: 2 });
    }

    #[test]
    fn unbounded_source_that_runs_dry_terminates() {
        let mut tuples = WeightedTuples::unbounded([7u8, 8].into_iter(), 1);
        assert_eq!(
            tuples.by_ref().collect::<Vec<_>>(),
            vec![vec![7], vec![8]]
        );
        assert_eq!(tuples.phase(), EnumerationPhase::Exhausted);
    }

    proptest! {
        #[test]
        fn prop_finite_enumeration_is_complete_and_weight_sorted(
            order in 1usize..=3,
            slots in 1usize..=3,
        ) {
            let indices: Vec<Vec<usize>> = WeightedTuples::finite(0..order, slots).collect();
            let expected = order.pow(u32::try_from(slots).expect("small slot count"));
            prop_assert_eq!(indices.len(), expected);

            let unique: BTreeSet<_> = indices.iter().cloned().collect();
            prop_assert_eq!(unique.len(), expected);
            prop_assert!(indices.windows(2).all(|pair| weight_of(&pair[0]) <= weight_of(&pair[1])));
            prop_assert!(indices.windows(2).all(|pair| {
                weight_of(&pair[0]) < weight_of(&pair[1]) || pair[0] > pair[1]
            }));

            let seed = det_seed(&[order, slots]);
            let log = build_property_log(
                "prop_finite_enumeration_is_complete_and_weight_sorted",
                seed,
                det_seed(&indices.concat()),
                "weighted_enumeration_complete",
            );
            assert_log_contract(&log);
        }

        #[test]
        fn prop_composition_count_matches_stars_and_bars(
            weight in 0usize..=6,
            parts in 1usize..=4,
        ) {
            let count = Compositions::new(weight, parts, None).count();
            let mut expected = 1usize;
            for k in 1..parts {
                expected = expected * (weight + k) / k;
            }
            prop_assert_eq!(count, expected);
            prop_assert!(Compositions::new(weight, parts, None).all(|c| weight_of(&c) == weight));
        }
    }
}
