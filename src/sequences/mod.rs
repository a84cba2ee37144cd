use bio::alphabets::Alphabet;
use lazy_static::lazy_static;

pub fn charify(chars: &str) -> Vec<u8> {
    chars.chars().map(|c| c as u8).collect()
}

pub static NUCLEOTIDES_STR: &str = "TCAG";
pub static AMB_NUCLEOTIDES_STR: &str = "RYSWKMBDHVNZX";
pub static AMINOACIDS_STR: &str = "ARNDCQEGHILKMFPSTWYV";
pub static AMB_AMINOACIDS_STR: &str = "BJZXUO";

/// Gap and missing data symbols accepted in aligned sequences.
pub static GAP_STR: &str = "-?.*";

/// Alphabet of every residue a oneliner sequence literal may contain: nucleotides and
/// amino acids in both cases, their ambiguity codes, gaps and missing data.
pub fn residue_alphabet() -> Alphabet {
    let mut residues = charify(NUCLEOTIDES_STR);
    residues.append(&mut charify(AMB_NUCLEOTIDES_STR));
    residues.append(&mut charify(AMINOACIDS_STR));
    residues.append(&mut charify(AMB_AMINOACIDS_STR));
    residues.append(&mut residues.clone().to_ascii_lowercase());
    residues.append(&mut charify(GAP_STR));
    Alphabet::new(residues)
}

lazy_static! {
    static ref RESIDUES: Alphabet = residue_alphabet();
}

pub fn is_residue_word(seq: &[u8]) -> bool {
    RESIDUES.is_word(seq)
}
