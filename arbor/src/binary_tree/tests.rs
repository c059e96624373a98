use super::*;

fn node(i: u32) -> TreeNodeIndex {
    TreeNodeIndex::new(i)
}

#[test]
fn root_of_full_trees() {
    assert_eq!(root(TreeSize::from_leaf_count(1)), node(0));
    assert_eq!(root(TreeSize::from_leaf_count(2)), node(1));
    assert_eq!(root(TreeSize::from_leaf_count(3)), node(3));
    assert_eq!(root(TreeSize::from_leaf_count(4)), node(3));
    assert_eq!(root(TreeSize::from_leaf_count(8)), node(7));
    assert_eq!(root(TreeSize::from_leaf_count(16)), node(15));
}

#[test]
fn children_and_parents() {
    // Tree with 8 leaves: root 7, its children 3 and 11.
    let p7 = ParentNodeIndex::new(3);
    assert_eq!(p7.to_tree_index(), 7);
    assert_eq!(left(p7), node(3));
    assert_eq!(right(p7), node(11));
    assert_eq!(parent(node(3)), p7);
    assert_eq!(parent(node(11)), p7);
    assert_eq!(parent(node(0)).to_tree_index(), 1);
    assert_eq!(parent(node(2)).to_tree_index(), 1);
    assert_eq!(sibling(node(0)), node(2));
    assert_eq!(sibling(node(2)), node(0));
    assert_eq!(sibling(node(5)), node(1));
}

#[test]
fn direct_path_and_copath() {
    let size = TreeSize::from_leaf_count(8);
    let leaf = LeafNodeIndex::new(2);
    let path: Vec<u32> = direct_path(leaf, size)
        .iter()
        .map(|p| p.to_tree_index())
        .collect();
    assert_eq!(path, vec![5, 3, 7]);
    let copath_ids: Vec<u32> = copath(leaf, size).iter().map(|n| n.u32()).collect();
    assert_eq!(copath_ids, vec![6, 1, 11]);

    // A single leaf tree has neither.
    let size = TreeSize::from_leaf_count(1);
    assert!(direct_path(LeafNodeIndex::new(0), size).is_empty());
    assert!(copath(LeafNodeIndex::new(0), size).is_empty());
}

#[test]
fn descendants() {
    let p3 = node(3);
    assert!(is_descendant(p3, LeafNodeIndex::new(0)));
    assert!(is_descendant(p3, LeafNodeIndex::new(3)));
    assert!(!is_descendant(p3, LeafNodeIndex::new(4)));
    assert!(is_descendant(node(4), LeafNodeIndex::new(2)));
    assert!(!is_descendant(node(4), LeafNodeIndex::new(3)));
    assert_eq!(leaves_under(node(11)), 4..8);
    assert_eq!(leaves_under(node(6)), 3..4);
}

#[test]
fn common_ancestor() {
    let lca = |a, b| lowest_common_ancestor(LeafNodeIndex::new(a), LeafNodeIndex::new(b));
    assert_eq!(lca(0, 1).to_tree_index(), 1);
    assert_eq!(lca(0, 2).to_tree_index(), 3);
    assert_eq!(lca(1, 6).to_tree_index(), 7);
    assert_eq!(lca(4, 7).to_tree_index(), 11);
}

#[test]
fn tree_size() {
    let mut size = TreeSize::from_leaf_count(3);
    assert_eq!(size.leaf_count(), 4);
    assert_eq!(size.node_count(), 7);
    assert_eq!(size.parent_count(), 3);
    size.inc();
    assert_eq!(size.leaf_count(), 8);
    size.dec();
    size.dec();
    assert_eq!(size.leaf_count(), 2);
    assert!(size.is_leaf_in_tree(LeafNodeIndex::new(1)));
    assert!(!size.is_leaf_in_tree(LeafNodeIndex::new(2)));
}
