//! Tree tests: sibling lookups, tree surgery, traversal order, naming and the
//! consistency invariants under random sequences of edits.

use msgtree::{Filter, MessageTree, NodeId, NodeRef, TypeRegistry};
use proptest::prelude::*;

/// Group `R` holding the chain `[a, b, c, d, e]` of opaque leaves.
fn chain_of_five() -> (MessageTree, NodeId, Vec<NodeId>) {
    let mut tree = MessageTree::new();
    let root = tree.new_group("R");
    let mut ids = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        let leaf = tree.new_opaque(name, None);
        assert!(tree.append_child(root, leaf));
        ids.push(leaf);
    }
    (tree, root, ids)
}

fn names(node: NodeRef<'_>) -> Vec<String> {
    node.children().map(|c| c.name().to_string()).collect()
}

fn node(tree: &MessageTree, id: NodeId) -> NodeRef<'_> {
    tree.get(id).expect("live node")
}

#[test]
fn test_sibling_absolute_from_any_member() {
    let (tree, _, ids) = chain_of_five();
    for &id in &ids {
        let n = node(&tree, id);
        assert_eq!(n.sibling("~2").map(|s| s.id()), Some(ids[2]));
        assert_eq!(n.sibling("~-1").map(|s| s.id()), Some(ids[4]));
        assert_eq!(n.sibling("~").map(|s| s.id()), Some(ids[0]));
        assert_eq!(n.sibling("~5"), None);
    }
}

#[test]
fn test_sibling_relative() {
    let (tree, _, ids) = chain_of_five();
    let b = node(&tree, ids[1]);
    assert_eq!(b.sibling("~r1").map(|s| s.id()), Some(ids[2]));
    assert_eq!(b.sibling("~r0").map(|s| s.id()), Some(ids[1]));
    assert_eq!(b.sibling("~r-1").map(|s| s.id()), Some(ids[0]));
    assert_eq!(b.sibling("~r-2"), None);
    assert_eq!(b.sibling("d~r0").map(|s| s.id()), Some(ids[3]));
}

#[test]
fn test_sibling_by_name_and_unique() {
    let (mut tree, root, ids) = chain_of_five();
    let dup = tree.new_opaque("b", None);
    assert!(tree.append_child(root, dup));
    let a = node(&tree, ids[0]);
    assert_eq!(a.sibling("b").map(|s| s.id()), Some(ids[1]));
    assert_eq!(a.sibling("b~1").map(|s| s.id()), Some(dup));
    assert_eq!(a.sibling("b~-1").map(|s| s.id()), Some(dup));
    assert_eq!(a.sibling("c~!").map(|s| s.id()), Some(ids[2]));
    assert_eq!(a.sibling("b~!"), None);
    assert_eq!(a.sibling("Opaque%~3").map(|s| s.id()), Some(ids[3]));
    assert_eq!(a.sibling("UInt%"), None);
}

#[test]
fn test_sibling_malformed_is_a_miss() {
    let (tree, _, ids) = chain_of_five();
    let a = node(&tree, ids[0]);
    assert_eq!(a.sibling("~x"), None);
    assert_eq!(a.sibling(""), None);
    assert!(a.try_sibling("~x").is_err());
    assert!(a.try_sibling("").is_err());
    assert_eq!(a.try_sibling("z").expect("well-formed"), None);
}

#[test]
fn test_remove_then_insert() {
    let (mut tree, root, ids) = chain_of_five();
    let removed = tree.remove(ids[2]).expect("remove c");
    assert_eq!(removed, ids[2]);
    assert_eq!(names(node(&tree, root)), ["a", "b", "d", "e"]);
    assert_eq!(node(&tree, ids[3]).previous().map(|p| p.id()), Some(ids[1]));
    assert!(node(&tree, root).check_consistency(true));
    assert!(node(&tree, removed).is_root());

    let x = tree.new_opaque("x", None);
    assert!(tree.insert(ids[3], x));
    assert_eq!(names(node(&tree, root)), ["a", "b", "x", "d", "e"]);
    assert!(node(&tree, root).check_consistency(true));
}

#[test]
fn test_insert_before_first_child() {
    let (mut tree, root, ids) = chain_of_five();
    let x = tree.new_opaque("x", None);
    assert!(tree.insert(ids[0], x));
    assert_eq!(node(&tree, root).first_child().map(|c| c.id()), Some(x));
    assert_eq!(node(&tree, x).parent().map(|p| p.id()), Some(root));
    assert!(node(&tree, root).check_consistency(true));
}

#[test]
fn test_surgery_rejects_attached_nodes() {
    let (mut tree, root, ids) = chain_of_five();
    assert!(!tree.insert(ids[4], ids[1]));
    assert!(!tree.replace(ids[4], ids[1]));
    assert!(!tree.append_next(ids[4], ids[1]));
    assert!(!tree.insert(ids[1], ids[1]));
    assert_eq!(names(node(&tree, root)), ["a", "b", "c", "d", "e"]);

    // a chain is not a single root
    let p = tree.new_opaque("p", None);
    let q = tree.new_opaque("q", None);
    assert!(tree.append_next(p, q));
    assert!(!tree.insert(ids[0], p));
    assert!(!tree.replace(ids[0], p));
    assert!(node(&tree, root).check_consistency(true));
}

#[test]
fn test_surgery_rejects_cycles() {
    let (mut tree, root, _) = chain_of_five();
    let group = tree.new_group("g");
    assert!(tree.append_child(root, group));
    assert!(!tree.append_child(group, root));
    assert!(!tree.append_next(group, root));
    assert!(node(&tree, root).check_consistency(true));
}

#[test]
fn test_append_child_to_terminal_refused() {
    let (mut tree, _, ids) = chain_of_five();
    let x = tree.new_opaque("x", None);
    assert!(!tree.append_child(ids[0], x));
    assert!(node(&tree, x).is_root());
}

#[test]
fn test_append_next_reparents_whole_chain() {
    let (mut tree, root, ids) = chain_of_five();
    let p = tree.new_opaque("p", None);
    let q = tree.new_opaque("q", None);
    assert!(tree.append_next(p, q));
    assert!(tree.append_next(ids[1], p));
    assert_eq!(names(node(&tree, root)), ["a", "b", "c", "d", "e", "p", "q"]);
    assert_eq!(node(&tree, q).parent().map(|n| n.id()), Some(root));
    assert!(node(&tree, root).check_consistency(true));
}

#[test]
fn test_replace_detaches_old_node() {
    let (mut tree, root, ids) = chain_of_five();
    let y = tree.new_opaque("y", None);
    assert!(tree.replace(ids[1], y));
    assert_eq!(names(node(&tree, root)), ["a", "y", "c", "d", "e"]);
    let old = node(&tree, ids[1]);
    assert!(old.is_root());
    assert!(!old.has_next());
    assert!(node(&tree, root).check_consistency(true));
}

#[test]
fn test_delete_following_and_children() {
    let (mut tree, root, ids) = chain_of_five();
    assert_eq!(tree.len(), 6);
    assert_eq!(tree.delete_following(ids[1]), 3);
    assert_eq!(names(node(&tree, root)), ["a", "b"]);
    assert_eq!(tree.len(), 3);
    assert!(!tree.contains(ids[4]));
    assert_eq!(tree.delete_children(root, 0), 2);
    assert!(!node(&tree, root).has_children());
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_delete_frees_subtree_and_stale_handles_stay_dead() {
    let (mut tree, root, ids) = chain_of_five();
    let group = tree.new_group("g");
    let leaf = tree.new_opaque("leaf", None);
    assert!(tree.append_child(group, leaf));
    assert!(tree.append_child(root, group));
    assert_eq!(tree.len(), 8);
    assert!(tree.delete(group));
    assert_eq!(tree.len(), 6);
    assert!(!tree.contains(leaf));

    // slots are reused, handles are not
    let fresh = tree.new_opaque("fresh", None);
    assert!(tree.get(leaf).is_none());
    assert!(tree.get(group).is_none());
    assert!(tree.contains(fresh));
    assert!(!tree.delete(leaf));
    assert!(tree.try_get(leaf).is_err());
    assert_eq!(names(node(&tree, root)), ["a", "b", "c", "d", "e"]);
    assert!(tree.contains(ids[0]));
}

/// `R { A { a1, a2 { x } }, B, C { c1 } }`
fn nested() -> (MessageTree, NodeId) {
    let mut tree = MessageTree::new();
    let root = tree.new_group("R");
    let a = tree.new_group("A");
    let a1 = tree.new_opaque("a1", None);
    let a2 = tree.new_group("a2");
    let x = tree.new_opaque("x", None);
    let b = tree.new_opaque("B", None);
    let c = tree.new_group("C");
    let c1 = tree.new_opaque("c1", None);
    assert!(tree.append_child(a2, x));
    assert!(tree.append_child(a, a1));
    assert!(tree.append_child(a, a2));
    assert!(tree.append_child(c, c1));
    assert!(tree.append_child(root, a));
    assert!(tree.append_child(root, b));
    assert!(tree.append_child(root, c));
    (tree, root)
}

fn traversal(tree: &MessageTree, root: NodeId) -> Vec<String> {
    std::iter::successors(tree.get(root), |n| n.successor())
        .map(|n| n.name().to_string())
        .collect()
}

#[test]
fn test_traversal_order() {
    let (tree, root) = nested();
    assert_eq!(traversal(&tree, root), ["R", "A", "a1", "a2", "x", "B", "C", "c1"]);

    let last = node(&tree, root).by_path("C/c1").expect("c1");
    let backwards: Vec<_> = std::iter::successors(Some(last), |n| n.predecessor())
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(backwards, ["c1", "C", "B", "x", "a2", "a1", "A", "R"]);
}

#[test]
fn test_counts_and_positions() {
    let (tree, root) = nested();
    let r = node(&tree, root);
    assert_eq!(r.n_nodes(), 8);
    assert_eq!(r.n_children(), 3);
    let x = r.by_path("A/a2/x").expect("x");
    assert_eq!(x.distance_to_root(), 3);
    assert!(x.is_descendant_of(root));
    assert!(!r.is_descendant_of(root));
    assert_eq!(x.root().id(), root);
    let c = r.child(2).expect("C");
    assert_eq!(c.name(), "C");
    assert_eq!(c.index_offset(), 2);
    assert_eq!(c.n_elements(), 3);
    assert_eq!(c.neighbor(-2).map(|n| n.name()), Some("A"));
    assert_eq!(c.neighbor(1), None);
    assert_eq!(c.neighbor(0), None);
    assert_eq!(r.last_child().map(|n| n.id()), Some(c.id()));
}

fn is_terminal(node: &NodeRef<'_>) -> bool {
    node.is_terminal()
}

#[test]
fn test_matching_neighbours() {
    let (tree, root) = nested();
    let a = node(&tree, root).first_child().expect("A");
    assert_eq!(a.next_matching(&is_terminal).map(|n| n.name()), Some("B"));
    let c = a.tail();
    assert_eq!(c.previous_matching(&Filter::by_name("A")).map(|n| n.id()), Some(a.id()));
    assert_eq!(c.next_matching(&is_terminal), None);
}

#[test]
fn test_ref_names_and_paths() {
    let mut tree = MessageTree::new();
    let root = tree.new_group("R");
    let first = tree.new_opaque("item", None);
    let second = tree.new_opaque("item", None);
    let nameless = tree.new_opaque("", None);
    for id in [first, second, nameless] {
        assert!(tree.append_child(root, id));
    }
    assert_eq!(node(&tree, first).ref_name(), "item");
    assert_eq!(node(&tree, second).ref_name(), "item~1");
    assert_eq!(node(&tree, nameless).ref_name(), "~2");
    assert_eq!(node(&tree, second).path(), "//R/item~1");
    assert_eq!(node(&tree, second).chained_name("."), "R.item");
    assert_eq!(node(&tree, nameless).chained_index("."), "0.2");

    let r = node(&tree, root);
    for id in [root, first, second, nameless] {
        let n = node(&tree, id);
        assert_eq!(r.by_path(&n.path()).map(|found| found.id()), Some(id), "{}", n.path());
    }
}

#[test]
fn test_unique_identifier() {
    let mut tree = MessageTree::new();
    let root = tree.new_group("R");
    let raw = tree.new_opaque("x", None);
    let int = tree.new_uint("x", 1, msgtree::Endianness::Big);
    let again = tree.new_opaque("x", None);
    for id in [raw, int, again] {
        assert!(tree.append_child(root, id));
    }
    assert_eq!(node(&tree, raw).unique_identifier(), "x");
    assert_eq!(node(&tree, int).unique_identifier(), "UInt%");
    assert_eq!(node(&tree, again).unique_identifier(), "x~2");
    for id in [raw, int, again] {
        let n = node(&tree, id);
        assert_eq!(n.head().sibling(&n.unique_identifier()).map(|s| s.id()), Some(id));
    }
    assert_eq!(node(&tree, int).identifier(), "UInt%x");
    assert_eq!(node(&tree, int).full_type(), "UInt");
}

#[test]
fn test_type_registry() {
    let mut registry = TypeRegistry::with_builtins();
    assert_eq!(registry.len(), 8);
    let sequence = registry.find_by_name("Sequence").expect("builtin");
    assert_eq!(sequence.type_inheritance(), "Node/Container/Sequence");
    assert!(sequence.inherits_from(registry.find_by_name("Node").expect("builtin")));
    assert!(!sequence.inherits_from(sequence));
    assert!(sequence.contains(sequence));
    assert!(!registry.add(sequence));

    static CUSTOM: msgtree::TypeDescriptor =
        msgtree::TypeDescriptor::derived(&msgtree::types::TERMINAL, 100, "Custom");
    static CLASH: msgtree::TypeDescriptor = msgtree::TypeDescriptor::new(100, "Other");
    assert!(CUSTOM.register(&mut registry));
    assert!(!CLASH.register(&mut registry));
    assert_eq!(registry.find_by_id(100).map(|d| d.name()), Some("Custom"));
    assert!(registry.to_string().contains("[  100] Custom ==> Terminal"));
}

// ---- random edit sequences ----

#[derive(Debug, Clone)]
enum Edit {
    Insert(usize),
    Replace(usize),
    Delete(usize),
    AppendChild(usize),
    AppendNext(usize),
    Move(usize, usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..64usize).prop_map(Edit::Insert),
        (0..64usize).prop_map(Edit::Replace),
        (0..64usize).prop_map(Edit::Delete),
        (0..64usize).prop_map(Edit::AppendChild),
        (0..64usize).prop_map(Edit::AppendNext),
        (0..64usize, 0..64usize).prop_map(|(a, b)| Edit::Move(a, b)),
    ]
}

/// Nodes of the tree below `root` in traversal order, root excluded.
fn members(tree: &MessageTree, root: NodeId) -> Vec<NodeId> {
    std::iter::successors(tree.get(root), |n| n.successor())
        .skip(1)
        .map(|n| n.id())
        .collect()
}

fn pick(nodes: &[NodeId], i: usize) -> Option<NodeId> {
    if nodes.is_empty() {
        None
    } else {
        Some(nodes[i % nodes.len()])
    }
}

/// Fresh node, a group every third time.
fn fresh(tree: &mut MessageTree, n: usize) -> NodeId {
    let name = format!("n{}", n);
    if n % 3 == 0 {
        tree.new_group(&name)
    } else {
        tree.new_opaque(&name, None)
    }
}

fn apply(tree: &mut MessageTree, root: NodeId, edit: &Edit, n: usize) {
    let nodes = members(tree, root);
    match *edit {
        Edit::Insert(i) => {
            let x = fresh(tree, n);
            let done = pick(&nodes, i).map_or(false, |at| tree.insert(at, x));
            if !done {
                assert!(tree.delete(x));
            }
        }
        Edit::Replace(i) => {
            let x = fresh(tree, n);
            match pick(&nodes, i) {
                Some(at) if tree.replace(at, x) => assert!(tree.delete(at)),
                _ => assert!(tree.delete(x)),
            }
        }
        Edit::Delete(i) => {
            if let Some(at) = pick(&nodes, i) {
                assert!(tree.delete(at));
            }
        }
        Edit::AppendChild(i) => {
            let x = fresh(tree, n);
            let at = pick(&nodes, i).unwrap_or(root);
            if !tree.append_child(at, x) {
                assert!(tree.delete(x));
            }
        }
        Edit::AppendNext(i) => {
            let x = fresh(tree, n);
            let done = pick(&nodes, i).map_or(false, |at| tree.append_next(at, x));
            if !done {
                assert!(tree.delete(x));
            }
        }
        Edit::Move(i, j) => {
            let (Some(from), Some(to)) = (pick(&nodes, i), pick(&nodes, j)) else {
                return;
            };
            let Some(moved) = tree.remove(from) else {
                return;
            };
            if !tree.insert(to, moved) {
                assert!(tree.delete(moved));
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_edits_preserve_consistency(edits in proptest::collection::vec(edit(), 1..40)) {
        let (mut tree, root) = nested();
        for (n, edit) in edits.iter().enumerate() {
            apply(&mut tree, root, edit, n);
            let r = tree.get(root).expect("root survives");
            prop_assert!(r.check_consistency(true), "after {:?}", edit);
            prop_assert!(r.is_root());
            // nothing leaks: every live node hangs below the root
            prop_assert_eq!(tree.len(), r.n_nodes());
        }
    }

    #[test]
    fn prop_traversal_is_its_own_inverse(edits in proptest::collection::vec(edit(), 0..30)) {
        let (mut tree, root) = nested();
        for (n, edit) in edits.iter().enumerate() {
            apply(&mut tree, root, edit, n);
        }
        for n in std::iter::successors(tree.get(root), |n| n.successor()) {
            if let Some(s) = n.successor() {
                prop_assert_eq!(s.predecessor().map(|p| p.id()), Some(n.id()));
            }
            if let Some(p) = n.predecessor() {
                prop_assert_eq!(p.successor().map(|s| s.id()), Some(n.id()));
            }
        }
    }
}

#[test]
fn test_attached_nodes_are_not_taken_as_templates() {
    let mut tree = MessageTree::new();
    let root = tree.new_group("R");
    let a = tree.new_opaque("a", Some(1));
    let b = tree.new_opaque("b", Some(1));
    assert!(tree.append_child(root, a));
    assert!(tree.append_child(root, b));

    let s = tree.new_sequence("s", None, None);
    assert!(!tree.set_element_template(s, Some(a)).expect("set template"));
    assert!(!tree.set_element_template(s, Some(s)).expect("set template"));
    let loose = tree.new_opaque("loose", Some(1));
    assert!(tree.set_element_template(s, Some(loose)).expect("set template"));
    assert!(tree.delete(s));

    let t = tree.new_sequence("t", Some(b), None);
    let record = tree.new_record("rec", vec![a]);
    assert!(tree.delete(t));
    assert!(tree.delete(record));

    let r = tree.get(root).expect("root");
    assert_eq!(r.n_children(), 2);
    assert!(r.check_consistency(true));
    assert!(tree.contains(a) && tree.contains(b));
    assert!(!tree.contains(loose));
}
