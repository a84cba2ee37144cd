use approx::assert_relative_eq;
use assert_matches::assert_matches;
use rstest::*;

use crate::downcast_error;
use crate::errors::ForestError;
use crate::substitution_models::{branch_count, compute_aicc, MODEL_TABLE};

#[test]
fn aicc_with_branch_lengths() {
    let aicc = compute_aicc(20.0, 1, 430, 10, true).unwrap();
    assert_relative_eq!(aicc, -2.3358, epsilon = 1e-4);
}

#[test]
fn aicc_without_branch_lengths() {
    // k = 4, n = 100
    let aicc = compute_aicc(-50.0, 4, 100, 10, false).unwrap();
    assert_relative_eq!(aicc, 100.0 + 8.0 + 40.0 / 95.0, epsilon = 1e-12);
}

#[rstest]
#[case::denominator_zero(28, 10, true)]
#[case::denominator_negative(5, 10, true)]
#[case::params_only(8, 8, false)]
fn aicc_for_short_alignments(#[case] sites: usize, #[case] params: usize, #[case] branches: bool) {
    let result = compute_aicc(-10.0, params, sites, 10, branches);
    assert_matches!(downcast_error(&result), ForestError::Domain(_));
}

#[rstest]
#[case(2, 1)]
#[case(3, 3)]
#[case(10, 17)]
fn branch_count_of_unrooted_tree(#[case] taxa: usize, #[case] branches: usize) {
    assert_eq!(branch_count(taxa), branches);
}

#[test]
fn model_table_contents() {
    assert_eq!(MODEL_TABLE.len(), 24);
    let names = MODEL_TABLE.names();
    assert_eq!(names.first().map(String::as_str), Some("JC69"));
    assert_eq!(names.last().map(String::as_str), Some("GTRIG"));
    for family in ["JC69", "F81", "K2P", "HKY", "SYM", "GTR"] {
        for suffix in ["", "I", "G", "IG"] {
            assert!(MODEL_TABLE.get(&format!("{family}{suffix}")).is_some());
        }
    }
    for candidate in MODEL_TABLE.iter() {
        assert!(candidate.directive.starts_with('+'));
        assert!(candidate.directive.ends_with("Y\n"));
    }
}

#[rstest]
#[case("JC69", 0)]
#[case("HKY", 4)]
#[case("SYMIG", 7)]
#[case("GTR", 8)]
#[case("GTRIG", 10)]
fn model_parameter_counts(#[case] name: &str, #[case] params: usize) {
    assert_eq!(MODEL_TABLE.get(name).unwrap().free_params, params);
}

#[test]
fn gtr_directive() {
    assert_eq!(
        MODEL_TABLE.get("GTR").unwrap().directive,
        "+\nM\nM\nM\nF\nR\nY\n"
    );
}

#[test]
fn unknown_model_candidate() {
    assert!(MODEL_TABLE.get("WAG").is_none());
    let result = MODEL_TABLE.candidate("WAG");
    let error = downcast_error(&result);
    assert_matches!(error, ForestError::InvalidModel { requested, available } => {
        assert_eq!(requested, "WAG");
        assert_eq!(available.len(), 24);
    });
    assert!(error.to_string().contains("GTR"));
}
