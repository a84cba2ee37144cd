use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use rstest::*;

use crate::alignment::Alignment;
use crate::errors::ForestError;
use crate::io::{alignment_from_oneliner, decode, read_lines_from_file, split_dataset};
use crate::model_selection::ExternalInferenceTool;
use crate::pipeline::{
    best_model_oneliner, best_model_tree, bootstrap_replicate, concatenate_oneliners,
    duplicate_oneliner, full_analysis, gene_tree, run_pipeline, run_stage, KeyedLine,
    PipelineConfig, Stage,
};
use crate::substitution_models::MODEL_TABLE;
use crate::{downcast_error, Result};

const TREE: &str = "((MusMuscu:0.1,GorGoril:0.2):0.05,PanTrogl:0.3,HomSapie:0.4);";

/// Prefers HKY over every other model.
struct HkyTool {
    calls: AtomicUsize,
}

impl HkyTool {
    fn new() -> HkyTool {
        HkyTool {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalInferenceTool for HkyTool {
    fn run(&self, alignment: &Alignment, directive: &str) -> Result<(f64, String)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(alignment.taxa_count(), 4);
        let hky = MODEL_TABLE.get("HKY").unwrap().directive;
        let log_likelihood = if directive == hky { -80.0 } else { -100.0 };
        Ok((log_likelihood, String::from(TREE)))
    }
}

fn oneliners() -> Vec<KeyedLine> {
    read_lines_from_file(&PathBuf::from("./data/3.oneliners"))
        .unwrap()
        .iter()
        .map(|line| KeyedLine::parse(line))
        .collect()
}

fn seeded() -> PipelineConfig {
    PipelineConfig {
        seed: Some(20),
        ..Default::default()
    }
}

#[rstest]
#[case::keyed("7\tchrm=c1:A,AC;\n", Some("7"), "chrm=c1:A,AC;")]
#[case::unkeyed("chrm=c1:A,AC;\n", None, "chrm=c1:A,AC;")]
#[case::two_tabs("7\tx\tchrm=c1:A,AC;", None, "7\tx\tchrm=c1:A,AC;")]
fn keyed_line_parsing(#[case] input: &str, #[case] key: Option<&str>, #[case] value: &str) {
    let line = KeyedLine::parse(input);
    assert_eq!(line.key.as_deref(), key);
    assert_eq!(line.value, value);
}

#[test]
fn keyed_line_display() {
    assert_eq!(KeyedLine::new("2", "A,AC;").to_string(), "2\tA,AC;");
    assert_eq!(KeyedLine::unkeyed("A,AC;").to_string(), "A,AC;");
}

#[test]
fn full_analysis_stages() {
    assert_eq!(
        full_analysis(10),
        [
            Stage::BestModelOneliners,
            Stage::Concatenate,
            Stage::Duplicate(10),
            Stage::Bootstrap,
            Stage::GeneTrees
        ]
    );
}

#[test]
fn duplicated_lines_count_down() {
    let line = KeyedLine::unkeyed("chrm=c1:A,AC;");
    let dups = duplicate_oneliner(&line, 5);
    assert!(dups.iter().all(|dup| dup.value == line.value));
    let keys: Vec<_> = dups.into_iter().map(|dup| dup.key.unwrap()).collect();
    assert_eq!(keys, ["5", "4", "3", "2", "1"]);
    assert!(duplicate_oneliner(&line, 0).is_empty());
}

#[test]
fn concatenation_groups_by_key() {
    let lines = vec![
        KeyedLine::new("1", "a:A,AC;"),
        KeyedLine::new("2", "b:A,AG;"),
        KeyedLine::new("1", "c:A,TT;"),
    ];
    assert_eq!(
        concatenate_oneliners(&lines),
        [
            KeyedLine::new("1", "a:A,AC;c:A,TT;"),
            KeyedLine::new("2", "b:A,AG;")
        ]
    );
}

#[test]
fn gene_tree_with_default_model() {
    let tool = HkyTool::new();
    let line = KeyedLine::new("4", "chrm=chr1_1036:A,ACGTAC,B,ACGTAA,C,ACGTTA,D,ACCTAA;");
    let output = gene_tree(&line, &tool, &PipelineConfig::default()).unwrap();
    assert_eq!(output.key.as_deref(), Some("4"));
    assert_eq!(
        output.value,
        format!("tree 'chrm=chr1_1036,lnL=-100,model=GTR' = [&U] {TREE}")
    );
    assert_eq!(tool.calls(), 1);
}

#[test]
fn gene_tree_with_own_model() {
    let tool = HkyTool::new();
    let line = KeyedLine::unkeyed("chrm=c9,model=HKY:A,ACGTAC,B,ACGTAA,C,ACGTTA,D,ACCTAA;");
    let output = gene_tree(&line, &tool, &PipelineConfig::default()).unwrap();
    assert!(output.value.starts_with("tree 'chrm=c9,lnL=-80,model=HKY'"));
}

#[test]
fn gene_tree_with_unknown_model() {
    let tool = HkyTool::new();
    let line = KeyedLine::unkeyed("chrm=c9,model=WAG:A,ACGTAC,B,ACGTAA,C,ACGTTA,D,ACCTAA;");
    let result = gene_tree(&line, &tool, &PipelineConfig::default());
    assert_matches!(downcast_error(&result), ForestError::InvalidModel { .. });
    assert_eq!(tool.calls(), 0);
}

#[test]
fn best_model_outputs() {
    let tool = HkyTool::new();
    let line = &oneliners()[0];

    let tree = best_model_tree(line, &tool, &PipelineConfig::default()).unwrap();
    assert_eq!(
        tree.value,
        format!("tree 'chrm=chr1_1036,model=HKY' = [&U] {TREE}")
    );

    let oneliner = best_model_oneliner(line, &tool, &PipelineConfig::default()).unwrap();
    assert_eq!(oneliner.key.as_deref(), Some("1"));
    let (metadata, pairs) = decode(&oneliner.value).unwrap();
    assert_eq!(metadata["model"], "HKY");
    assert_eq!(metadata["chrm"], "chr1_1036");
    assert_eq!(pairs, decode(&line.value).unwrap().1);
    assert_eq!(tool.calls(), 48);
}

#[test]
fn gene_trees_of_fixture() {
    let tool = HkyTool::new();
    let trees = run_stage(Stage::GeneTrees, &oneliners(), &tool, &seeded()).unwrap();
    assert_eq!(trees.len(), 3);
    for (tree, chrm) in trees.iter().zip(["chr1_1036", "chr2_2210", "chr7_0412"]) {
        assert!(tree.key.is_none());
        assert!(tree.value.starts_with(&format!("tree 'chrm={chrm},")));
        assert!(tree.value.contains("model=GTR"));
        assert!(tree.value.ends_with(TREE));
    }
}

#[test]
fn bootstrap_replicate_keyed_by_index() {
    let dataset = std::fs::read_to_string("./data/3.dataset").unwrap();
    let line = KeyedLine::new("17", dataset.trim());
    let loci = bootstrap_replicate(&line, 0, &seeded()).unwrap();
    assert_eq!(loci.len(), 3);
    for locus in &loci {
        assert_eq!(locus.key.as_deref(), Some("17"));
        let alignment = alignment_from_oneliner(&locus.value).unwrap();
        assert_eq!(alignment.model(), Some("GTR"));
        assert_eq!(alignment.taxa_count(), 4);
    }
    assert_eq!(loci, bootstrap_replicate(&line, 0, &seeded()).unwrap());
}

#[test]
fn same_keyed_lines_get_independent_replicates() {
    let dataset = std::fs::read_to_string("./data/3.dataset").unwrap();
    let lines = vec![
        KeyedLine::new("1", dataset.trim()),
        KeyedLine::new("1", dataset.trim()),
    ];
    let tool = HkyTool::new();
    let output = run_stage(Stage::Bootstrap, &lines, &tool, &seeded()).unwrap();
    assert_eq!(output.len(), 6);
    assert!(output.iter().all(|line| line.key.as_deref() == Some("1")));
    assert_ne!(output[..3], output[3..]);
    assert_eq!(output, run_stage(Stage::Bootstrap, &lines, &tool, &seeded()).unwrap());
}

#[test]
fn bootstrap_replicate_without_key() {
    let dataset = std::fs::read_to_string("./data/3.dataset").unwrap();
    let line = KeyedLine::unkeyed(dataset.trim());
    let loci = bootstrap_replicate(&line, 2, &seeded()).unwrap();
    assert!(loci.iter().all(|locus| locus.key.as_deref() == Some("3")));
}

#[test]
fn bootstrap_of_malformed_line() {
    let line = KeyedLine::new("1", "chrm=c1:A,ACGT,B;");
    let result = bootstrap_replicate(&line, 0, &seeded());
    assert_matches!(downcast_error(&result), ForestError::Format(_));
}

#[test]
fn full_analysis_of_fixture() {
    let tool = HkyTool::new();
    let trees = run_pipeline(&full_analysis(2), oneliners(), &tool, &seeded()).unwrap();
    assert_eq!(tool.calls(), 3 * 24 + 2 * 3);
    assert_eq!(trees.len(), 6);
    let keys: Vec<_> = trees.iter().filter_map(|tree| tree.key.as_deref()).collect();
    assert_eq!(keys, ["2", "2", "2", "1", "1", "1"]);
    for tree in &trees {
        assert!(tree.value.starts_with("tree 'chrm=chr"));
        assert!(tree.value.contains("lnL=-80,model=HKY"));
    }
}

#[test]
fn intermediate_stages_of_full_analysis() {
    let tool = HkyTool::new();
    let stages = &full_analysis(3)[..3];
    let lines = run_pipeline(stages, oneliners(), &tool, &seeded()).unwrap();
    assert_eq!(lines.len(), 3);
    for line in &lines {
        let records = split_dataset(&line.value);
        assert_eq!(records.len(), 3);
        assert!(records
            .iter()
            .all(|record| decode(record).unwrap().0["model"] == "HKY"));
    }
}
