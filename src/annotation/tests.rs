use rstest::*;

use crate::alignment::Metadata;
use crate::annotation::{annotate, make_label};
use crate::metadata;

#[rstest]
#[case::single(metadata!("chrm" => "chr1_1036"), "chrm=chr1_1036")]
#[case::sorted(
    metadata!("model" => "HKY", "lnL" => "-12.5", "chrm" => "chr1_1036"),
    "chrm=chr1_1036,lnL=-12.5,model=HKY"
)]
#[case::empty(metadata!(), "")]
fn label_from_metadata(#[case] metadata: Metadata, #[case] label: &str) {
    assert_eq!(make_label(&metadata), label);
}

#[test]
fn annotated_tree_statement() {
    let tree = "((MusMuscu:0.1,GorGoril:0.2):0.05,PanTrogl:0.3,HomSapie:0.4);\n";
    assert_eq!(
        annotate(tree, &metadata!("chrm" => "chr2_2210", "model" => "K2PG")),
        "tree 'chrm=chr2_2210,model=K2PG' = [&U] \
         ((MusMuscu:0.1,GorGoril:0.2):0.05,PanTrogl:0.3,HomSapie:0.4);"
    );
}
