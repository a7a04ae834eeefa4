//! Benchmark: streaming dissection of a synthetic payload of length-prefixed
//! records (whole slice vs. 7-byte chunks through an open reader), repair after an
//! edit, and path resolution on the resulting tree.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use msgtree::{Endianness, MessageTree, NodeId, SliceReader};

const RECORDS: usize = 256;

/// `RECORDS` records with 2-byte big-endian lengths and bodies of 0..32 bytes.
fn payload() -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..RECORDS {
        let len = i % 32;
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend((0..len).map(|b| (b + i) as u8));
    }
    out
}

fn payload_tree(tree: &mut MessageTree) -> NodeId {
    let record = tree.new_length_prefixed("record", 2, Endianness::Big);
    tree.new_sequence("payload", Some(record), None)
}

fn bench_dissect(c: &mut Criterion) {
    let data = payload();

    c.bench_function("dissect_records_whole", |b| {
        b.iter(|| {
            let mut tree = MessageTree::new();
            let root = payload_tree(&mut tree);
            let n = tree.dissect_bytes(root, black_box(&data)).unwrap_or(0);
            black_box(n)
        })
    });

    c.bench_function("dissect_records_chunked", |b| {
        b.iter(|| {
            let mut tree = MessageTree::new();
            let root = payload_tree(&mut tree);
            let mut n = 0;
            for chunk in data.chunks(7) {
                let mut reader = SliceReader::open(chunk);
                n += tree.dissect(root, &mut reader).unwrap_or(0);
            }
            black_box(n)
        })
    });

    let mut tree = MessageTree::new();
    let root = payload_tree(&mut tree);
    let _ = tree.dissect_bytes(root, &data);

    c.bench_function("repair_records", |b| {
        b.iter(|| black_box(tree.repair(root, true).unwrap_or(false)))
    });

    let paths = ["/record~100/body", "//payload/record~-1/length", "//**/record~r5", "*/UInt%"];
    c.bench_function("resolve_paths", |b| {
        b.iter(|| {
            let Some(node) = tree.get(root) else {
                return 0;
            };
            paths
                .iter()
                .filter(|p| node.by_path(black_box(p)).is_some())
                .count()
        })
    });

    let last = tree
        .get(root)
        .and_then(|n| n.last_child())
        .map(|n| n.id());
    c.bench_function("path_of_last_record", |b| {
        b.iter(|| last.and_then(|id| tree.get(id)).map(|n| black_box(n.path())))
    });
}

criterion_group!(benches, bench_dissect);
criterion_main!(benches);
