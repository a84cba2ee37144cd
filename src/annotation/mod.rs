use itertools::Itertools;

use crate::alignment::Metadata;

/// Builds a tree label from locus metadata: `key=value` pairs in key order, joined by `,`.
pub fn make_label(metadata: &Metadata) -> String {
    metadata
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .join(",")
}

/// Wraps a Newick tree into a labelled, unrooted tree statement as read by NEXUS-style
/// tree summary tools.
///
/// # Example
/// ```
/// use cloudforest::alignment::Metadata;
/// use cloudforest::annotation::annotate;
/// let mut metadata = Metadata::new();
/// metadata.insert(String::from("model"), String::from("GTR"));
/// metadata.insert(String::from("chrm"), String::from("chr1_1036"));
/// assert_eq!(
///     annotate("(A,B,C);", &metadata),
///     "tree 'chrm=chr1_1036,model=GTR' = [&U] (A,B,C);"
/// );
/// ```
pub fn annotate(tree: &str, metadata: &Metadata) -> String {
    format!("tree '{}' = [&U] {}", make_label(metadata), tree.trim())
}

#[cfg(test)]
mod tests;
