//! Path fuzz target: parse arbitrary text as a path and resolve it on a small tree.
//! Parsing must not panic; resolution must return a node of the same tree or nothing.
//! Build with: cargo fuzz run path_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let mut tree = msgtree::MessageTree::new();
    let record = tree.new_length_prefixed("record", 1, msgtree::Endianness::Big);
    let root = tree.new_sequence("payload", Some(record), None);
    let _ = tree.dissect_bytes(root, &[2, 0xaa, 0xbb, 0, 1, 0xcc]);
    let Some(node) = tree.get(root) else {
        return;
    };
    let _ = msgtree::IndexedFilter::parse(s);
    if let Ok(Some(found)) = node.try_by_path(s) {
        assert!(tree.contains(found.id()));
    }
    for child in node.children() {
        let _ = child.sibling(s);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run path_fuzz");
}
