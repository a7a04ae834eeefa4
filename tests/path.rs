//! Path and filter expression tests: anchors, wildcards, typed wildcards, filters
//! on static and dynamic types, and how syntax errors are reported.

use msgtree::{
    Anchor, Discriminant, Endianness, Filter, Index, IndexedFilter, MessageTree, NodeId, NodePath,
    Record, Segment, SyntaxError,
};

/// `R { A { leaf, num: UInt, leaf }, B { leaf } }`
fn sample() -> (MessageTree, NodeId) {
    let mut tree = MessageTree::new();
    let root = tree.new_group("R");
    let a = tree.new_group("A");
    let b = tree.new_group("B");
    let a_leaf = tree.new_opaque("leaf", None);
    let a_num = tree.new_uint("num", 2, Endianness::Big);
    let a_leaf2 = tree.new_opaque("leaf", None);
    let b_leaf = tree.new_opaque("leaf", None);
    for id in [a_leaf, a_num, a_leaf2] {
        assert!(tree.append_child(a, id));
    }
    assert!(tree.append_child(b, b_leaf));
    assert!(tree.append_child(root, a));
    assert!(tree.append_child(root, b));
    (tree, root)
}

fn path_of(tree: &MessageTree, from: NodeId, path: &str) -> Option<String> {
    tree.get(from)
        .and_then(|n| n.by_path(path))
        .map(|n| n.chained_ref_name("/"))
}

#[test]
fn test_root_anchors() {
    let (tree, root) = sample();
    assert_eq!(path_of(&tree, root, "/A").as_deref(), Some("R/A"));
    assert_eq!(path_of(&tree, root, "//A").as_deref(), Some("R/A"));
    assert_eq!(path_of(&tree, root, "//R/A").as_deref(), Some("R/A"));
    assert_eq!(path_of(&tree, root, "/").as_deref(), Some("R"));
    assert_eq!(path_of(&tree, root, "//"), None);
    assert_eq!(path_of(&tree, root, "/R"), None);

    let leaf = tree.get(root).and_then(|r| r.by_path("B/leaf")).expect("B/leaf").id();
    assert_eq!(path_of(&tree, leaf, "/A").as_deref(), Some("R/A"));
    assert_eq!(path_of(&tree, leaf, "//A/num").as_deref(), Some("R/A/num"));
}

#[test]
fn test_relative_segments() {
    let (tree, root) = sample();
    let a = tree.get(root).and_then(|r| r.first_child()).expect("A").id();
    assert_eq!(path_of(&tree, a, ".").as_deref(), Some("R/A"));
    assert_eq!(path_of(&tree, a, "./num").as_deref(), Some("R/A/num"));
    assert_eq!(path_of(&tree, a, "..").as_deref(), Some("R"));
    assert_eq!(path_of(&tree, a, "../B/leaf").as_deref(), Some("R/B/leaf"));
    assert_eq!(path_of(&tree, a, "leaf~1").as_deref(), Some("R/A/leaf~1"));
    assert_eq!(path_of(&tree, a, "leaf~-1").as_deref(), Some("R/A/leaf~1"));
    assert_eq!(path_of(&tree, a, "num/..").as_deref(), Some("R/A"));
    // one level above the root is never a result
    assert_eq!(path_of(&tree, a, "../.."), None);
    assert_eq!(path_of(&tree, a, "../../.."), None);
    assert_eq!(path_of(&tree, a, "../../R/B").as_deref(), Some("R/B"));
}

#[test]
fn test_wildcards() {
    let (tree, root) = sample();
    let a = tree.get(root).and_then(|r| r.first_child()).expect("A").id();
    // "*" steps into the first child
    assert_eq!(path_of(&tree, a, "*").as_deref(), Some("R/A/leaf"));
    let leaf = tree.get(a).and_then(|n| n.first_child()).expect("leaf").id();
    assert_eq!(path_of(&tree, leaf, "*"), None);

    // "*" backtracks over the children until the rest matches
    assert_eq!(path_of(&tree, root, "*/num").as_deref(), Some("R/A/num"));
    assert_eq!(path_of(&tree, root, "*/leaf~!").as_deref(), Some("R/B/leaf"));
    assert_eq!(path_of(&tree, root, "*/*/*"), None);

    // "**" absorbs one or more levels
    assert_eq!(path_of(&tree, root, "**/num").as_deref(), Some("R/A/num"));
    assert_eq!(path_of(&tree, root, "//**/leaf").as_deref(), Some("R/A/leaf"));
    assert_eq!(path_of(&tree, root, "**").as_deref(), Some("R/A"));
    assert_eq!(path_of(&tree, root, "**/missing"), None);
}

#[test]
fn test_typed_wildcards() {
    let (tree, root) = sample();
    let a = tree.get(root).and_then(|r| r.first_child()).expect("A").id();
    assert_eq!(path_of(&tree, a, "UInt%~*").as_deref(), Some("R/A/num"));
    assert_eq!(path_of(&tree, root, "B~*/leaf").as_deref(), Some("R/B/leaf"));
    assert_eq!(path_of(&tree, root, "Container%~*/Opaque%~-1").as_deref(), Some("R/A/leaf~1"));
    assert_eq!(path_of(&tree, root, "UInt%~*"), None);
}

#[test]
fn test_syntax_errors_are_distinguishable() {
    let (tree, root) = sample();
    let r = tree.get(root).expect("root");
    assert_eq!(r.by_path("A/~x"), None);
    assert!(matches!(r.try_by_path("A/~x"), Err(SyntaxError::Parse(_))));
    assert!(matches!(r.try_by_path("A/missing"), Ok(None)));
    assert!(matches!(
        IndexedFilter::parse("a~99999999999999999999999"),
        Err(SyntaxError::Index(_))
    ));
    assert_eq!(IndexedFilter::parse(""), Err(SyntaxError::Empty));
    assert!(Filter::parse("a~1").is_err());
    assert!(Filter::parse("").expect("empty filter").is_wildcard());
}

#[test]
fn test_parse_filters() {
    let f: Filter = "Extension:heartbeat%hb".parse().expect("filter");
    assert_eq!(f, Filter::new("hb", "Extension", "heartbeat"));
    assert_eq!(f.to_string(), "Extension:heartbeat%hb");

    let f = Filter::parse(":heartbeat%").expect("filter");
    assert_eq!(f, Filter::new("", "", "heartbeat"));
    assert_eq!(f.to_string(), ":heartbeat%");

    let f = Filter::parse("UInt%").expect("filter");
    assert_eq!(f, Filter::new("", "UInt", ""));
    assert_eq!(Filter::parse("length").expect("filter"), Filter::by_name("length"));
}

#[test]
fn test_parse_indices() {
    let cases = [
        ("x", Index::Absolute { position: 0, backwards: false }),
        ("x~", Index::Absolute { position: 0, backwards: false }),
        ("x~3", Index::Absolute { position: 3, backwards: false }),
        ("x~-1", Index::Absolute { position: 1, backwards: true }),
        ("x~r2", Index::Relative { offset: 2, backwards: false }),
        ("x~r-2", Index::Relative { offset: 2, backwards: true }),
        ("x~!", Index::Unique),
    ];
    for (text, index) in cases {
        let parsed = IndexedFilter::parse(text).expect(text);
        assert_eq!(parsed.filter, Filter::by_name("x"), "{}", text);
        assert_eq!(parsed.index, index, "{}", text);
    }
    assert_eq!(IndexedFilter::parse("x~r-2").expect("parse").to_string(), "x~r-2");
    assert_eq!(IndexedFilter::parse("x~0").expect("parse").to_string(), "x");
}

#[test]
fn test_parse_paths() {
    let path = NodePath::parse("//**/UInt%~*/..").expect("path");
    assert_eq!(path.anchor, Anchor::VirtualRoot);
    assert_eq!(
        path.segments,
        vec![
            Segment::Deep,
            Segment::TypedWildcard(Filter::new("", "UInt", "")),
            Segment::Parent,
        ]
    );
    let path: NodePath = "/a/./b~2/*".parse().expect("path");
    assert_eq!(path.anchor, Anchor::Root);
    assert_eq!(path.segments.len(), 4);
    assert_eq!(path.segments[1], Segment::Current);
    assert_eq!(path.segments[3], Segment::Any);
    assert_eq!(NodePath::parse("a").expect("path").anchor, Anchor::Relative);
    assert_eq!(NodePath::parse("///").expect("path").anchor, Anchor::VirtualRoot);
    assert!(NodePath::parse("/").expect("path").segments.is_empty());
}

#[test]
fn test_dynamic_type_filters() {
    let mut tree = MessageTree::new();
    let kind = tree.new_uint("kind", 1, Endianness::Big);
    let data = tree.new_opaque("data", Some(2));
    let layout = Record::new(vec![kind, data]).with_discriminant(Discriminant {
        member: 0,
        types: vec![(1, "heartbeat".to_string()), (2, "close".to_string())],
    });
    let ext = tree.new_container("ext", Box::new(layout));
    let root = tree.new_group("R");
    assert!(tree.append_child(root, ext));
    assert_eq!(tree.dissect_bytes(ext, &[1, 0xaa, 0xbb]).expect("dissect"), 3);

    let r = tree.get(root).expect("root");
    let ext_ref = r.first_child().expect("ext");
    assert_eq!(ext_ref.dynamic_type(), "heartbeat");
    assert_eq!(ext_ref.full_type(), "Record:heartbeat");
    assert_eq!(ext_ref.identifier(), "Record:heartbeat%ext");
    assert!(r.by_path("Record:heartbeat%").is_some());
    assert!(r.by_path(":heartbeat%ext/kind").is_some());
    assert!(r.by_path(":close%").is_none());
    assert_eq!(r.by_path("ext/data").map(|d| d.raw_bytes()), Some(vec![0xaa, 0xbb]));
}
