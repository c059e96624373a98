use tls_codec::{Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait};

use super::{
    errors::TreeSyncError,
    node::{
        encryption_keys::EncryptionKeyPair,
        leaf_node::{LeafNodeParams, TreeInfoTbs, TreePosition},
    },
    *,
};
use crate::{
    binary_tree::root, ciphersuite::hash, credentials::AcceptAllCredentials, test_utils::*,
};

struct Member {
    leaf_node: LeafNode,
    signer: SignatureKeyPair,
}

fn member(provider: &impl ArborProvider, ciphersuite: Ciphersuite, identity: &[u8]) -> Member {
    let (bundle, signer) = new_key_package(provider, ciphersuite, identity);
    Member {
        leaf_node: bundle.key_package().leaf_node().clone(),
        signer,
    }
}

/// A tree with three members at leaves 0, 1 and 2.
fn three_member_tree(
    provider: &impl ArborProvider,
    ciphersuite: Ciphersuite,
) -> (RatchetTree, Vec<Member>) {
    let members: Vec<_> = [b"Alice".as_slice(), b"Bob", b"Charlie"]
        .into_iter()
        .map(|identity| member(provider, ciphersuite, identity))
        .collect();
    let mut tree = RatchetTree::new(members[0].leaf_node.clone());
    for member in &members[1..] {
        tree.add_leaf(member.leaf_node.clone())
            .expect("adding a leaf failed");
    }
    (tree, members)
}

fn path_keys(provider: &impl ArborProvider, ciphersuite: Ciphersuite, n: usize) -> Vec<EncryptionKey> {
    (0..n)
        .map(|_| {
            EncryptionKeyPair::random(provider.crypto(), provider.rand(), ciphersuite)
                .expect("Not enough randomness.")
                .public_key()
                .clone()
        })
        .collect()
}

/// Let the member at leaf 0 apply a path and re-sign its leaf with the
/// resulting parent hash.
fn commit_from_leaf_zero(
    provider: &impl ArborProvider,
    ciphersuite: Ciphersuite,
    tree: &mut RatchetTree,
    committer: &Member,
    group_id: &GroupId,
) {
    let committer_index = LeafNodeIndex::new(0);
    let keys = path_keys(
        provider,
        ciphersuite,
        tree.filtered_direct_path(committer_index).len(),
    );
    let parent_hash = tree
        .apply_path(provider.crypto(), ciphersuite, committer_index, keys)
        .expect("applying the path failed");
    let leaf_node = LeafNode::new_with_key(
        committer.leaf_node.encryption_key().clone(),
        LeafNodeParams::derive(&committer.leaf_node),
        LeafNodeSource::Commit(parent_hash.into()),
        TreeInfoTbs::Commit(TreePosition::new(group_id.clone(), committer_index)),
        &committer.signer,
    )
    .expect("signing failed");
    tree.set_leaf(committer_index, leaf_node)
        .expect("leaf 0 exists");
}

#[apply(ciphersuites_and_providers)]
fn add_and_remove_leaves(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (mut tree, members) = three_member_tree(provider, ciphersuite);
    assert_eq!(tree.tree_size().leaf_count(), 4);
    assert_eq!(tree.members().count(), 3);
    assert_eq!(tree.free_leaf_index(), LeafNodeIndex::new(3));
    assert_eq!(
        tree.find_leaf(&members[1].leaf_node),
        Some(LeafNodeIndex::new(1))
    );

    // Removed leaves are reused from the left.
    tree.remove_leaf(LeafNodeIndex::new(1))
        .expect("leaf 1 exists");
    assert_eq!(tree.free_leaf_index(), LeafNodeIndex::new(1));
    assert_eq!(
        tree.remove_leaf(LeafNodeIndex::new(1)),
        Err(TreeSyncError::LeafNotInTree(LeafNodeIndex::new(1)))
    );
    let dave = member(provider, ciphersuite, b"Dave");
    assert_eq!(
        tree.add_leaf(dave.leaf_node.clone()),
        Ok(LeafNodeIndex::new(1))
    );

    // The tree shrinks once its right half is blank.
    tree.remove_leaf(LeafNodeIndex::new(2))
        .expect("leaf 2 exists");
    assert_eq!(tree.tree_size().leaf_count(), 2);
    assert_eq!(tree.export().nodes().len(), 3);

    // And grows when it is full.
    let eve = member(provider, ciphersuite, b"Eve");
    assert_eq!(tree.add_leaf(eve.leaf_node), Ok(LeafNodeIndex::new(2)));
    assert_eq!(tree.tree_size().leaf_count(), 4);
}

#[apply(ciphersuites_and_providers)]
fn export_and_import(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (mut tree, members) = three_member_tree(provider, ciphersuite);
    let group_id = GroupId::from_slice(b"tree test");
    commit_from_leaf_zero(provider, ciphersuite, &mut tree, &members[0], &group_id);

    let exported = tree.export();
    // Leaf 3 is blank and not exported.
    assert_eq!(exported.nodes().len(), 5);
    let encoded = exported.tls_serialize_detached().expect("encoding failed");
    let decoded = RatchetTreeIn::tls_deserialize_exact(&encoded).expect("decoding failed");
    let imported = RatchetTree::from_ratchet_tree_in(decoded).expect("import failed");
    assert_eq!(imported, tree);
    assert_eq!(
        imported.tree_hash(crypto, ciphersuite).expect("hashing failed"),
        tree.tree_hash(crypto, ciphersuite).expect("hashing failed")
    );
    imported
        .validate(crypto, ciphersuite, &group_id, &AcceptAllCredentials)
        .expect("invalid tree");
}

#[apply(ciphersuites_and_providers)]
fn malformed_trees(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = member(provider, ciphersuite, b"Alice");
    let leaf = Some(Node::LeafNode(alice.leaf_node));
    let import = |nodes: Vec<Option<Node>>| {
        RatchetTree::from_ratchet_tree_in(RatchetTreeIn::from_nodes(nodes))
    };

    assert!(matches!(
        import(vec![]),
        Err(TreeSyncError::MalformedTree(_))
    ));
    assert!(matches!(
        import(vec![leaf.clone(), None]),
        Err(TreeSyncError::MalformedTree(_))
    ));
    assert!(matches!(
        import(vec![leaf.clone(), None, None]),
        Err(TreeSyncError::MalformedTree(_))
    ));
    // A leaf in a parent position.
    assert!(matches!(
        import(vec![leaf.clone(), leaf.clone(), leaf.clone()]),
        Err(TreeSyncError::MalformedTree(_))
    ));
    assert!(import(vec![leaf]).is_ok());
}

#[apply(ciphersuites_and_providers)]
fn resolution_and_unmerged_leaves(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (mut tree, members) = three_member_tree(provider, ciphersuite);
    let size = tree.tree_size();
    let leaf = |i| TreeNodeIndex::Leaf(LeafNodeIndex::new(i));

    // All parents are blank: the resolution of the root is every leaf.
    assert_eq!(
        tree.resolution(root(size), &[]),
        vec![leaf(0), leaf(1), leaf(2)]
    );
    assert_eq!(
        tree.resolution(root(size), &[LeafNodeIndex::new(1)]),
        vec![leaf(0), leaf(2)]
    );
    // Leaf 3 is blank but both copath children of its direct path are not.
    assert_eq!(tree.filtered_direct_path(LeafNodeIndex::new(3)).len(), 2);

    let group_id = GroupId::from_slice(b"tree test");
    commit_from_leaf_zero(provider, ciphersuite, &mut tree, &members[0], &group_id);
    assert_eq!(tree.resolution(root(size), &[]), vec![root(size)]);

    // A new leaf is unmerged in the non-blank parents above it.
    let dave = member(provider, ciphersuite, b"Dave");
    let dave_index = tree.add_leaf(dave.leaf_node).expect("adding a leaf failed");
    assert_eq!(dave_index, LeafNodeIndex::new(3));
    assert_eq!(
        tree.resolution(root(size), &[]),
        vec![root(size), leaf(3)]
    );
    assert_eq!(tree.resolution(root(size), &[dave_index]), vec![root(size)]);

    // The tree with unmerged leaves still verifies.
    tree.validate(
        provider.crypto(),
        ciphersuite,
        &group_id,
        &AcceptAllCredentials,
    )
    .expect("invalid tree");
    let imported =
        RatchetTree::from_ratchet_tree_in(tree.export()).expect("unmerged leaves are consistent");
    assert_eq!(imported, tree);
}

#[apply(ciphersuites_and_providers)]
fn tree_hash_covers_the_tree(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (mut tree, members) = three_member_tree(provider, ciphersuite);
    let before = tree.tree_hash(crypto, ciphersuite).expect("hashing failed");
    assert_eq!(before.len(), ciphersuite.hash_length());

    // Flipping a signature byte keeps the leaf decodable but changes the hash.
    let mut encoded = members[1]
        .leaf_node
        .tls_serialize_detached()
        .expect("encoding failed");
    let last = encoded.len() - 1;
    encoded[last] ^= 0x01;
    let corrupted = LeafNode::tls_deserialize_exact(&encoded).expect("decoding failed");
    assert_ne!(corrupted, members[1].leaf_node);
    let mut tampered = RatchetTree::new(members[0].leaf_node.clone());
    tampered.add_leaf(corrupted).expect("adding a leaf failed");
    tampered
        .add_leaf(members[2].leaf_node.clone())
        .expect("adding a leaf failed");
    assert_eq!(tampered.tree_size(), tree.tree_size());
    assert_ne!(
        tampered.tree_hash(crypto, ciphersuite).expect("hashing failed"),
        before
    );

    tree.remove_leaf(LeafNodeIndex::new(1))
        .expect("leaf 1 exists");
    let after = tree.tree_hash(crypto, ciphersuite).expect("hashing failed");
    assert_ne!(before, after);
}

#[apply(ciphersuites_and_providers)]
fn tree_hash_of_three_leaves(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (tree, members) = three_member_tree(provider, ciphersuite);
    let digest = |input: &[u8]| hash(crypto, ciphersuite, input).expect("hashing failed");

    // TreeHashInput of a leaf: node type, leaf index, optional leaf node.
    let leaf_hash = |index: u32, leaf_node: Option<&LeafNode>| {
        let mut input = vec![0x01];
        input.extend_from_slice(&index.to_be_bytes());
        match leaf_node {
            Some(leaf_node) => {
                input.push(0x01);
                input.extend(leaf_node.tls_serialize_detached().expect("encoding failed"));
            }
            None => input.push(0x00),
        }
        digest(&input)
    };
    // TreeHashInput of a blank parent: node type, absent node, both child hashes.
    let blank_parent_hash = |left: Vec<u8>, right: Vec<u8>| {
        let mut input = vec![0x02, 0x00, left.len() as u8];
        input.extend(left);
        input.push(right.len() as u8);
        input.extend(right);
        digest(&input)
    };

    let blank_leaf = leaf_hash(3, None);
    assert_eq!(
        blank_leaf,
        hex::decode("caf009ad02a57a48feb8d64d055509e9a81edba8d325e442cfe75e006a520006")
            .expect("invalid hex")
    );
    let left = blank_parent_hash(
        leaf_hash(0, Some(&members[0].leaf_node)),
        leaf_hash(1, Some(&members[1].leaf_node)),
    );
    let right = blank_parent_hash(leaf_hash(2, Some(&members[2].leaf_node)), blank_leaf);
    assert_eq!(
        tree.tree_hash(crypto, ciphersuite).expect("hashing failed"),
        blank_parent_hash(left, right)
    );
}

#[apply(ciphersuites_and_providers)]
fn parent_hashes(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (mut tree, members) = three_member_tree(provider, ciphersuite);
    let group_id = GroupId::from_slice(b"tree test");

    // A path without the matching leaf breaks the parent hash chain.
    let mut unsigned = tree.clone();
    let keys = path_keys(provider, ciphersuite, 2);
    unsigned
        .apply_path(crypto, ciphersuite, LeafNodeIndex::new(0), keys)
        .expect("applying the path failed");
    assert_eq!(
        unsigned.verify_parent_hashes(crypto, ciphersuite),
        Err(TreeSyncError::InvalidParentHash)
    );

    commit_from_leaf_zero(provider, ciphersuite, &mut tree, &members[0], &group_id);
    tree.verify_parent_hashes(crypto, ciphersuite)
        .expect("parent hashes do not verify");

    // The path length has to match the filtered direct path.
    let keys = path_keys(provider, ciphersuite, 1);
    assert_eq!(
        tree.clone()
            .apply_path(crypto, ciphersuite, LeafNodeIndex::new(1), keys),
        Err(TreeSyncError::PathLengthMismatch)
    );
}

#[apply(ciphersuites_and_providers)]
fn validation(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (mut tree, members) = three_member_tree(provider, ciphersuite);
    let group_id = GroupId::from_slice(b"tree test");
    tree.validate(crypto, ciphersuite, &group_id, &AcceptAllCredentials)
        .expect("invalid tree");

    // Keys must be unique across the tree.
    assert_eq!(
        tree.check_key_uniqueness(&members[1].leaf_node, None),
        Err(TreeSyncError::DuplicateEncryptionKey)
    );
    assert!(tree
        .check_key_uniqueness(&members[1].leaf_node, Some(LeafNodeIndex::new(1)))
        .is_ok());
    let mut duplicate = tree.clone();
    duplicate
        .add_leaf(members[2].leaf_node.clone())
        .expect("adding a leaf failed");
    assert_eq!(
        duplicate.validate(crypto, ciphersuite, &group_id, &AcceptAllCredentials),
        Err(TreeSyncError::DuplicateEncryptionKey)
    );

    // Every leaf signature is checked.
    tree.leaf_mut(LeafNodeIndex::new(2))
        .expect("leaf 2 exists")
        .corrupt_signature();
    assert!(matches!(
        tree.validate(crypto, ciphersuite, &group_id, &AcceptAllCredentials),
        Err(TreeSyncError::SignatureError(_))
    ));
}

#[apply(ciphersuites_and_providers)]
fn leaves_must_support_the_ciphersuite(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = member(provider, ciphersuite, b"Alice");
    let tree = RatchetTree::new(alice.leaf_node.clone());
    let capabilities = alice.leaf_node.capabilities();
    assert!(capabilities.supports_ciphersuite(ciphersuite));
    assert!(alice.leaf_node.validate_locally(ciphersuite).is_ok());
    assert!(tree
        .validate(
            provider.crypto(),
            ciphersuite,
            &GroupId::from_slice(b"group"),
            &AcceptAllCredentials
        )
        .is_ok());

    let restricted = Capabilities::new(None, Some(&[ciphersuite][..]), None, None, None);
    assert!(!restricted.supports_ciphersuite(
        if ciphersuite == Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519 {
            Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519
        } else {
            Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
        }
    ));
}
