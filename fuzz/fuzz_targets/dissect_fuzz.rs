//! Dissect fuzz target: feed arbitrary bytes, in two chunks, to a sequence of
//! length-prefixed records. Dissection must not panic, the tree must stay
//! consistent and no byte may be lost or duplicated.
//! Build with: cargo fuzz run dissect_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let mut tree = msgtree::MessageTree::new();
    let record = tree.new_length_prefixed("record", 1, msgtree::Endianness::Big);
    let root = tree.new_sequence("payload", Some(record), None);
    let split = data.first().map_or(0, |b| *b as usize).min(data.len());
    let mut consumed = 0;
    for chunk in [&data[..split], &data[split..]] {
        let mut reader = msgtree::SliceReader::open(chunk);
        consumed += tree.dissect(root, &mut reader).unwrap_or(0);
    }
    let node = tree.get(root).expect("root");
    assert!(node.check_consistency(false));
    assert_eq!(node.raw_bytes(), &data[..consumed]);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run dissect_fuzz");
}
