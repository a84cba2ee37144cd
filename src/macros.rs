#[macro_export]
macro_rules! metadata {
    () => {{
        $crate::alignment::Metadata::new()
    }};
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut metadata = $crate::alignment::Metadata::new();
        $(metadata.insert(String::from($key), String::from($value));)+
        metadata
    }};
}

#[macro_export]
macro_rules! pairs {
    ($(($taxon:expr, $seq:expr)),* $(,)?) => {{
        let pairs: $crate::alignment::TaxonPairs =
            vec![$((String::from($taxon), String::from($seq))),*];
        pairs
    }};
}

#[macro_export]
macro_rules! aln {
    ($meta:expr, $pairs:expr) => {{
        $crate::alignment::Alignment::new($meta, $pairs).unwrap()
    }};
}
