#![forbid(unsafe_code)]

use std::fmt;

use ms_core::Ring;

/// Dense integer-mod matrices need `(modulus - 1)^2` to fit a machine word.
pub const MODN_DENSE_MAX_MODULUS: u64 = 46_341;
pub const MODN_SPARSE_MAX_MODULUS: u64 = 46_341;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Representation {
    IntegerDense = 0,
    IntegerSparse = 1,
    RationalDense = 2,
    RationalSparse = 3,
    CyclotomicDense = 4,
    RealDoubleDense = 5,
    ComplexDoubleDense = 6,
    Mod2Dense = 7,
    ModNDenseSmall = 8,
    ModNSparseSmall = 9,
    MPolyDenseOverField = 10,
    SymbolicDense = 11,
    GenericDense = 12,
    GenericSparse = 13,
}

impl Representation {
    #[must_use]
    pub const fn all() -> &'static [Representation] {
        &[
            Representation::IntegerDense,
            Representation::IntegerSparse,
            Representation::RationalDense,
            Representation::RationalSparse,
            Representation::CyclotomicDense,
            Representation::RealDoubleDense,
            Representation::ComplexDoubleDense,
            Representation::Mod2Dense,
            Representation::ModNDenseSmall,
            Representation::ModNSparseSmall,
            Representation::MPolyDenseOverField,
            Representation::SymbolicDense,
            Representation::GenericDense,
            Representation::GenericSparse,
        ]
    }

    #[must_use]
    pub const fn is_sparse(self) -> bool {
        matches!(
            self,
            Self::IntegerSparse
                | Self::RationalSparse
                | Self::ModNSparseSmall
                | Self::GenericSparse
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IntegerDense => "integer_dense",
            Self::IntegerSparse => "integer_sparse",
            Self::RationalDense => "rational_dense",
            Self::RationalSparse => "rational_sparse",
            Self::CyclotomicDense => "cyclotomic_dense",
            Self::RealDoubleDense => "real_double_dense",
            Self::ComplexDoubleDense => "complex_double_dense",
            Self::Mod2Dense => "mod2_dense",
            Self::ModNDenseSmall => "modn_dense_small",
            Self::ModNSparseSmall => "modn_sparse_small",
            Self::MPolyDenseOverField => "mpoly_dense_over_field",
            Self::SymbolicDense => "symbolic_dense",
            Self::GenericDense => "generic_dense",
            Self::GenericSparse => "generic_sparse",
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionRule {
    IntegerRing,
    RationalField,
    CyclotomicField,
    RealDoubleField,
    ComplexDoubleField,
    ModTwo,
    ModNBelow { ceiling: u64 },
    MPolynomialOverField,
    SymbolicRing,
    Fallback,
}

impl SelectionRule {
    #[must_use]
    pub fn matches(self, ring: &Ring) -> bool {
        match (self, ring) {
            (Self::IntegerRing, Ring::Integers)
            | (Self::RationalField, Ring::Rationals)
            | (Self::CyclotomicField, Ring::Cyclotomic { .. })
            | (Self::RealDoubleField, Ring::RealDouble)
            | (Self::ComplexDoubleField, Ring::ComplexDouble)
            | (Self::ModTwo, Ring::IntegerMod { modulus: 2 })
            | (Self::SymbolicRing, Ring::Symbolic)
            | (Self::Fallback, _) => true,
            (Self::ModNBelow { ceiling }, Ring::IntegerMod { modulus }) => *modulus < ceiling,
            (Self::MPolynomialOverField, Ring::MPolynomial { base, .. }) => base.is_field(),
            _ => false,
        }
    }
}

const DENSE_PRIORITY: [(SelectionRule, Representation); 9] = [
    (SelectionRule::IntegerRing, Representation::IntegerDense),
    (SelectionRule::RationalField, Representation::RationalDense),
    (
        SelectionRule::CyclotomicField,
        Representation::CyclotomicDense,
    ),
    (
        SelectionRule::RealDoubleField,
        Representation::RealDoubleDense,
    ),
    (
        SelectionRule::ComplexDoubleField,
        Representation::ComplexDoubleDense,
    ),
    (SelectionRule::ModTwo, Representation::Mod2Dense),
    (
        SelectionRule::ModNBelow {
            ceiling: MODN_DENSE_MAX_MODULUS,
        },
        Representation::ModNDenseSmall,
    ),
    (
        SelectionRule::MPolynomialOverField,
        Representation::MPolyDenseOverField,
    ),
    (SelectionRule::SymbolicRing, Representation::SymbolicDense),
];

const SPARSE_PRIORITY: [(SelectionRule, Representation); 3] = [
    (
        SelectionRule::ModNBelow {
            ceiling: MODN_SPARSE_MAX_MODULUS,
        },
        Representation::ModNSparseSmall,
    ),
    (SelectionRule::RationalField, Representation::RationalSparse),
    (SelectionRule::IntegerRing, Representation::IntegerSparse),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepresentationDecision {
    pub representation: Representation,
    pub rule: SelectionRule,
    pub sparse: bool,
    pub fallback_used: bool,
}

/// Walks the priority list for `sparse` and returns the first matching rule.
#[must_use]
pub fn select_representation(ring: &Ring, sparse: bool) -> RepresentationDecision {
    let (priority, fallback): (&[(SelectionRule, Representation)], Representation) = if sparse {
        (&SPARSE_PRIORITY, Representation::GenericSparse)
    } else {
        (&DENSE_PRIORITY, Representation::GenericDense)
    };
    let (rule, representation) = priority
        .iter()
        .find(|(rule, _)| rule.matches(ring))
        .copied()
        .unwrap_or((SelectionRule::Fallback, fallback));
    RepresentationDecision {
        representation,
        rule,
        sparse,
        fallback_used: rule == SelectionRule::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use ms_core::Ring;
    use proptest::prelude::*;

    use super::{
        DENSE_PRIORITY, MODN_DENSE_MAX_MODULUS, MODN_SPARSE_MAX_MODULUS, Representation,
        SPARSE_PRIORITY, SelectionRule, select_representation,
    };

    fn det_seed(parts: &[u64]) -> u64 {
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
        branch: &str,
        seed: u64,
        selected: u8,
        reason_code: &str,
    ) -> BTreeMap<String, String> {
        let mut log = BTreeMap::new();
        log.insert("suite_id".to_string(), "ms_dispatch_property".to_string());
        log.insert("test_id".to_string(), test_id.to_string());
        log.insert(
            "scenario_id".to_string(),
            format!("selector/{branch}:{test_id}"),
        );
        log.insert("seed".to_string(), seed.to_string());
        log.insert("selected".to_string(), selected.to_string());
        log.insert(
            "replay_command".to_string(),
            format!("cargo test -p ms-dispatch {test_id} -- --nocapture"),
        );
        log.insert("outcome".to_string(), "pass".to_string());
        log.insert("reason_code".to_string(), reason_code.to_string());
        log
    }

    fn assert_log_contract(log: &BTreeMap<String, String>) {
        for key in [
            "suite_id",
            "test_id",
            "scenario_id",
            "seed",
            "selected",
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

    fn qq_poly() -> Ring {
        Ring::MPolynomial {
            base: Box::new(Ring::Rationals),
            variables: 2,
        }
    }

    #[test]
    fn dense_branch_resolves_each_family() {
        let cases = [
            (Ring::Integers, Representation::IntegerDense),
            (Ring::Rationals, Representation::RationalDense),
            (
                Ring::Cyclotomic { conductor: 5 },
                Representation::CyclotomicDense,
            ),
            (Ring::RealDouble, Representation::RealDoubleDense),
            (Ring::ComplexDouble, Representation::ComplexDoubleDense),
            (Ring::IntegerMod { modulus: 2 }, Representation::Mod2Dense),
            (
                Ring::IntegerMod { modulus: 7 },
                Representation::ModNDenseSmall,
            ),
            (qq_poly(), Representation::MPolyDenseOverField),
            (Ring::Symbolic, Representation::SymbolicDense),
        ];
        for (ring, expected) in cases {
            let decision = select_representation(&ring, false);
            assert_eq!(decision.representation, expected, "ring {ring}");
            assert!(!decision.fallback_used);
        }
    }

    #[test]
    fn sparse_branch_resolves_each_family() {
        assert_eq!(
            select_representation(&Ring::IntegerMod { modulus: 2 }, true).representation,
            Representation::ModNSparseSmall
        );
        assert_eq!(
            select_representation(&Ring::Rationals, true).representation,
            Representation::RationalSparse
        );
        assert_eq!(
            select_representation(&Ring::Integers, true).representation,
            Representation::IntegerSparse
        );
        let fallback = select_representation(&Ring::RealDouble, true);
        assert_eq!(fallback.representation, Representation::GenericSparse);
        assert!(fallback.fallback_used);
        assert_eq!(fallback.rule, SelectionRule::Fallback);
    }

    #[test]
    fn every_tag_is_reachable() {
        let rings = [
            Ring::Integers,
            Ring::Rationals,
            Ring::Cyclotomic { conductor: 3 },
            Ring::RealDouble,
            Ring::ComplexDouble,
            Ring::IntegerMod { modulus: 2 },
            Ring::IntegerMod { modulus: 11 },
            qq_poly(),
            Ring::Symbolic,
            Ring::Generic {
                name: "Quaternions".to_string(),
                order: None,
            },
        ];
        let reached: BTreeSet<Representation> = rings
            .iter()
            .flat_map(|ring| {
                [
                    select_representation(ring, false).representation,
                    select_representation(ring, true).representation,
                ]
            })
            .collect();
        let all: BTreeSet<Representation> = Representation::all().iter().copied().collect();
        assert_eq!(reached, all);
    }

    #[test]
    fn mod_two_wins_over_small_modulus_rule() {
        let decision = select_representation(&Ring::IntegerMod { modulus: 2 }, false);
        assert_eq!(decision.rule, SelectionRule::ModTwo);
        assert!(
            SelectionRule::ModNBelow {
                ceiling: MODN_DENSE_MAX_MODULUS
            }
            .matches(&Ring::IntegerMod { modulus: 2 })
        );
    }

    #[test]
    fn modulus_ceiling_falls_through_to_generic() {
        let below = Ring::IntegerMod {
            modulus: MODN_DENSE_MAX_MODULUS - 1,
        };
        let at = Ring::IntegerMod {
            modulus: MODN_DENSE_MAX_MODULUS,
        };
        assert_eq!(
            select_representation(&below, false).representation,
            Representation::ModNDenseSmall
        );
        assert_eq!(
            select_representation(&at, false).representation,
            Representation::GenericDense
        );
        let sparse_at = Ring::IntegerMod {
            modulus: MODN_SPARSE_MAX_MODULUS,
        };
        assert_eq!(
            select_representation(&sparse_at, true).representation,
            Representation::GenericSparse
        );
    }

    #[test]
    fn polynomials_over_non_fields_use_generic_dense() {
        let zz_poly = Ring::MPolynomial {
            base: Box::new(Ring::Integers),
            variables: 1,
        };
        let decision = select_representation(&zz_poly, false);
        assert_eq!(decision.representation, Representation::GenericDense);
        assert!(decision.fallback_used);
    }

    #[test]
    fn tag_sparsity_tracks_branch() {
        for tag in Representation::all() {
            let in_dense = DENSE_PRIORITY.iter().any(|(_, rep)| rep == tag)
                || *tag == Representation::GenericDense;
            let in_sparse = SPARSE_PRIORITY.iter().any(|(_, rep)| rep == tag)
                || *tag == Representation::GenericSparse;
            assert_ne!(
                in_dense, in_sparse,
                "tag {tag} must belong to exactly one branch"
            );
            assert_eq!(tag.is_sparse(), in_sparse);
        }
    }

    proptest! {
        #[test]
        fn prop_first_matching_rule_wins(modulus in 1u64..100_000, sparse in any::<bool>()) {
            let ring = Ring::IntegerMod { modulus };
            let decision = select_representation(&ring, sparse);
            let priority: &[(SelectionRule, Representation)] =
                if sparse { &SPARSE_PRIORITY } else { &DENSE_PRIORITY };
            let first = priority.iter().position(|(rule, _)| rule.matches(&ring));
            match first {
                Some(index) => prop_assert_eq!(decision.rule, priority[index].0),
                None => prop_assert!(decision.fallback_used),
            }
            prop_assert_eq!(decision.representation.is_sparse(), sparse);
            prop_assert_eq!(decision.sparse, sparse);

            let seed = det_seed(&[modulus, u64::from(sparse)]);
            let log = build_property_log(
                "prop_first_matching_rule_wins",
                if sparse { "sparse" } else { "dense" },
                seed,
                decision.representation as u8,
                "first_match_ok",
            );
            assert_log_contract(&log);
        }
    }
}
