use serde::Deserialize;

use super::*;
use crate::mls::utilities::serde::serde_test::load_test_vector;

#[derive(Debug, Deserialize)]
struct TreeMathTest {
    n_leaves: u32,
    n_nodes: u32,
    root: u32,
    left: Vec<Option<u32>>,
    right: Vec<Option<u32>>,
    parent: Vec<Option<u32>>,
    sibling: Vec<Option<u32>>,
}

fn tree_math_test(tc: &TreeMathTest) {
    let n = NumLeaves(tc.n_leaves);
    assert_eq!(n.width(), tc.n_nodes, "width of {} leaves", tc.n_leaves);
    assert_eq!(n.root(), NodeIndex(tc.root), "root of {} leaves", tc.n_leaves);
    assert_eq!(
        NumLeaves::from_width(tc.n_nodes as usize),
        Some(n),
        "leaf count from width"
    );

    for i in 0..tc.n_nodes {
        let x = NodeIndex(i);
        assert_eq!(x.left(), tc.left[i as usize].map(NodeIndex), "left({i})");
        assert_eq!(x.right(), tc.right[i as usize].map(NodeIndex), "right({i})");
        assert_eq!(n.parent(x), tc.parent[i as usize].map(NodeIndex), "parent({i})");
        assert_eq!(
            n.sibling(x),
            tc.sibling[i as usize].map(NodeIndex),
            "sibling({i})"
        );
    }
}

#[test]
fn test_tree_math() {
    let tests: Vec<TreeMathTest> = load_test_vector("test-vectors/tree-math.json");
    for tc in &tests {
        tree_math_test(tc);
    }
}

#[test]
fn direct_path_and_copath_pair_up() {
    let n = NumLeaves(8);
    let leaf = LeafIndex(2).node_index();
    assert_eq!(
        n.direct_path(leaf),
        vec![NodeIndex(5), NodeIndex(3), NodeIndex(7)]
    );
    assert_eq!(n.copath(leaf), vec![NodeIndex(6), NodeIndex(1), NodeIndex(11)]);
    assert!(n.direct_path(n.root()).is_empty(), "root has no direct path");
}

#[test]
fn common_ancestor_of_leaves() {
    let n = NumLeaves(8);
    let lca = |a: u32, b: u32| n.common_ancestor(LeafIndex(a).node_index(), LeafIndex(b).node_index());
    assert_eq!(lca(0, 1), NodeIndex(1));
    assert_eq!(lca(0, 2), NodeIndex(3));
    assert_eq!(lca(1, 7), NodeIndex(7));
    assert_eq!(lca(4, 6), NodeIndex(11));
    assert_eq!(lca(5, 5), NodeIndex(10));
}

#[test]
fn subtree_membership() {
    assert!(NodeIndex(4).is_in_subtree_of(NodeIndex(3)));
    assert!(NodeIndex(3).is_in_subtree_of(NodeIndex(3)));
    assert!(!NodeIndex(8).is_in_subtree_of(NodeIndex(3)));
    assert!(NodeIndex(14).is_in_subtree_of(NodeIndex(11)));
}

#[test]
fn width_must_describe_power_of_two_leaves() {
    assert_eq!(NumLeaves::from_width(5), None);
    assert_eq!(NumLeaves::from_width(4), None);
    assert_eq!(NumLeaves::from_width(7), Some(NumLeaves(4)));
}

#[test]
fn oversized_leaf_index_maps_to_no_slot() {
    assert_eq!(LeafIndex(0x7fff_ffff).node_index(), NodeIndex(0xffff_fffe));
    assert_eq!(LeafIndex(0x8000_0000).node_index(), NodeIndex(u32::MAX));
    assert!(!NumLeaves(1 << 30).contains(LeafIndex(u32::MAX).node_index()));
}
