use crate::mls::crypto::credential::Credential;
use crate::mls::crypto::provider::RustCryptoProvider;
use crate::mls::crypto::{cipher_suite::CipherSuite, Secret};
use crate::mls::key_package::KeyPairPackage;
use crate::mls::ratchet_tree::path::derive_path;
use crate::mls::ratchet_tree::*;
use crate::mls::utilities::error::*;
use crate::mls::utilities::serde::{Deserializer, Serializer};
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex, NumLeaves};

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;
const GROUP_CONTEXT: &[u8] = b"serialized group context";

fn member(name: &str) -> KeyPairPackage {
    KeyPairPackage::generate(&RustCryptoProvider, SUITE, Credential::basic(name.to_owned()))
        .expect("key package generation")
}

fn tree_of(members: &[KeyPairPackage]) -> RatchetTree {
    let mut tree = RatchetTree::new(members[0].public.leaf_node().clone());
    for m in &members[1..] {
        tree.add_leaf(m.public.leaf_node().clone())
            .expect("tree has room");
    }
    tree
}

fn private_tree_of(tree: &RatchetTree, members: &[KeyPairPackage], leaf: u32) -> PrivateTree {
    PrivateTree::new(
        tree.width(),
        LeafIndex(leaf),
        members[leaf as usize].private.encryption_key.clone(),
    )
}

fn nodes(indices: &[u32]) -> Vec<NodeIndex> {
    indices.iter().copied().map(NodeIndex).collect()
}

#[test]
fn add_leaf_fills_blanks_before_growing() -> Result<()> {
    let members: Vec<_> = ["alice", "bob", "carol"].into_iter().map(member).collect();
    let mut tree = tree_of(&members[..2]);
    assert_eq!(tree.num_leaves(), NumLeaves(2));
    assert_eq!(tree.width(), 3);

    let carol = tree.add_leaf(members[2].public.leaf_node().clone())?;
    assert_eq!(carol, LeafIndex(2));
    assert_eq!(tree.num_leaves(), NumLeaves(4));
    assert_eq!(tree.width(), 7);

    tree.blank_leaf(LeafIndex(1))?;
    let again = tree.add_leaf(member("dave").public.leaf_node().clone())?;
    assert_eq!(again, LeafIndex(1));
    assert_eq!(tree.leaves().count(), 3);

    Ok(())
}

#[test]
fn find_leaf_matches_by_content() {
    let members: Vec<_> = ["alice", "bob"].into_iter().map(member).collect();
    let tree = tree_of(&members);

    assert_eq!(
        tree.find_leaf(members[1].public.leaf_node()),
        Some(LeafIndex(1))
    );
    assert_eq!(tree.find_leaf(member("eve").public.leaf_node()), None);
}

#[test]
fn blank_leaf_truncates_empty_right_half() -> Result<()> {
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let mut tree = tree_of(&members);

    tree.blank_leaf(LeafIndex(3))?;
    assert_eq!(tree.num_leaves(), NumLeaves(4));

    tree.blank_leaf(LeafIndex(2))?;
    assert_eq!(tree.num_leaves(), NumLeaves(2));
    assert_eq!(tree.width(), 3);

    tree.blank_leaf(LeafIndex(1))?;
    assert_eq!(tree.width(), 1);

    assert_eq!(tree.blank_leaf(LeafIndex(5)), Err(Error::InvalidLeafIndex(5)));
    Ok(())
}

#[test]
fn blank_or_missing_leaves_cannot_be_changed() -> Result<()> {
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let mut tree = tree_of(&members);
    tree.blank_leaf(LeafIndex(1))?;

    assert_eq!(tree.blank_leaf(LeafIndex(1)), Err(Error::BlankLeaf(1)));
    assert_eq!(
        tree.update_leaf(LeafIndex(1), members[1].public.leaf_node().clone()),
        Err(Error::BlankLeaf(1))
    );
    assert_eq!(
        tree.update_leaf(LeafIndex(4), members[1].public.leaf_node().clone()),
        Err(Error::InvalidLeafIndex(4))
    );
    Ok(())
}

#[test]
fn resolution_follows_blanks_and_unmerged_leaves() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let mut tree = tree_of(&members);

    // fresh tree: no parent keys yet
    assert_eq!(tree.resolution(NodeIndex(3)), nodes(&[0, 2, 4, 6]));

    tree.blank_leaf(LeafIndex(3))?;
    assert_eq!(tree.resolution(NodeIndex(5)), nodes(&[4]));
    assert_eq!(tree.filtered_direct_path(LeafIndex(0)), nodes(&[1, 3]));
    assert_eq!(tree.filtered_direct_path(LeafIndex(2)), nodes(&[3]));

    let derived = derive_path(
        &crypto_provider,
        SUITE,
        Secret::new(vec![1; 32]),
        &nodes(&[0, 1, 3]),
    )?;
    let path_keys = derived.public_keys()[1..].to_vec();
    tree.merge_path(LeafIndex(0), members[0].public.leaf_node().clone(), path_keys)?;
    assert_eq!(tree.resolution(NodeIndex(3)), nodes(&[3]));

    let dave = tree.add_leaf(member("dave").public.leaf_node().clone())?;
    assert_eq!(dave, LeafIndex(3));
    assert_eq!(tree.resolution(NodeIndex(3)), nodes(&[3, 6]));
    assert_eq!(tree.resolution(NodeIndex(5)), nodes(&[4, 6]));

    Ok(())
}

#[test]
fn merge_path_checks_path_length() {
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let mut tree = tree_of(&members);

    assert_eq!(
        tree.merge_path(LeafIndex(0), members[0].public.leaf_node().clone(), vec![]),
        Err(Error::UpdatePathLengthMismatch {
            expected: 2,
            actual: 0,
        })
    );
}

#[test]
fn update_path_reaches_every_other_member() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let tree = tree_of(&members);
    let committer = LeafIndex(0);

    let filtered = tree.filtered_direct_path(committer);
    let mut path_nodes = vec![committer.node_index()];
    path_nodes.extend(&filtered);
    let derived = derive_path(
        &crypto_provider,
        SUITE,
        Secret::new(vec![7; 32]),
        &path_nodes,
    )?;

    let update_path = UpdatePath::new(
        &crypto_provider,
        SUITE,
        &tree,
        committer,
        members[0].public.leaf_node().clone(),
        &derived.nodes[1..],
        &[],
        GROUP_CONTEXT,
    )?;
    assert_eq!(update_path.nodes.len(), filtered.len());

    for (receiver, want_position) in [(1u32, 0usize), (2, 1), (3, 1)] {
        let private_tree = private_tree_of(&tree, &members, receiver);
        let (position, path_secret) = update_path.decrypt_path_secret(
            &crypto_provider,
            SUITE,
            &tree,
            &private_tree,
            committer,
            LeafIndex(receiver),
            &[],
            GROUP_CONTEXT,
        )?;
        assert_eq!(position, want_position, "receiver {receiver}");

        let received = derive_path(&crypto_provider, SUITE, path_secret, &filtered[position..])?;
        received.verify_public_keys(&update_path.public_keys()[position..])?;
        assert_eq!(received.commit_secret, derived.commit_secret);
    }

    Ok(())
}

#[test]
fn update_path_skips_excluded_leaves() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let tree = tree_of(&members);
    let committer = LeafIndex(0);
    let excluded = [LeafIndex(3)];

    let derived = derive_path(
        &crypto_provider,
        SUITE,
        Secret::new(vec![9; 32]),
        &nodes(&[0, 1, 3]),
    )?;
    let update_path = UpdatePath::new(
        &crypto_provider,
        SUITE,
        &tree,
        committer,
        members[0].public.leaf_node().clone(),
        &derived.nodes[1..],
        &excluded,
        GROUP_CONTEXT,
    )?;
    assert_eq!(update_path.nodes[1].encrypted_path_secret.len(), 1);

    let result = update_path.decrypt_path_secret(
        &crypto_provider,
        SUITE,
        &tree,
        &private_tree_of(&tree, &members, 3),
        committer,
        LeafIndex(3),
        &excluded,
        GROUP_CONTEXT,
    );
    assert_eq!(result, Err(Error::NoDecryptablePathSecret));
    Ok(())
}

#[test]
fn update_path_is_bound_to_group_context() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let members: Vec<_> = ["a", "b"].into_iter().map(member).collect();
    let tree = tree_of(&members);

    let derived = derive_path(
        &crypto_provider,
        SUITE,
        Secret::new(vec![3; 32]),
        &nodes(&[0, 1]),
    )?;
    let update_path = UpdatePath::new(
        &crypto_provider,
        SUITE,
        &tree,
        LeafIndex(0),
        members[0].public.leaf_node().clone(),
        &derived.nodes[1..],
        &[],
        GROUP_CONTEXT,
    )?;

    let result = update_path.decrypt_path_secret(
        &crypto_provider,
        SUITE,
        &tree,
        &private_tree_of(&tree, &members, 1),
        LeafIndex(0),
        LeafIndex(1),
        &[],
        b"another context",
    );
    assert_eq!(result, Err(Error::HpkeDecryptionFailed));
    Ok(())
}

#[test]
fn derived_keys_must_match_advertised_keys() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let derived = derive_path(
        &crypto_provider,
        SUITE,
        Secret::new(vec![5; 32]),
        &nodes(&[1, 3]),
    )?;
    let other = derive_path(
        &crypto_provider,
        SUITE,
        Secret::new(vec![6; 32]),
        &nodes(&[1, 3]),
    )?;

    derived.verify_public_keys(&derived.public_keys())?;
    assert_eq!(
        derived.verify_public_keys(&other.public_keys()),
        Err(Error::PublicKeyMismatch)
    );
    assert_eq!(
        derived.verify_public_keys(&derived.public_keys()[..1]),
        Err(Error::PublicKeyMismatch)
    );
    Ok(())
}

#[test]
fn private_tree_forgets_blanked_nodes() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let mut tree = tree_of(&members);
    let mut private_tree = private_tree_of(&tree, &members, 1);

    let derived = derive_path(
        &crypto_provider,
        SUITE,
        Secret::new(vec![4; 32]),
        &nodes(&[2, 1, 3]),
    )?;
    tree.merge_path(
        LeafIndex(1),
        members[1].public.leaf_node().clone(),
        derived.public_keys()[1..].to_vec(),
    )?;
    derived.install(&mut private_tree);
    private_tree.sync(&tree, LeafIndex(1));
    assert!(private_tree.get(NodeIndex(1)).is_some());
    assert!(private_tree.get(NodeIndex(3)).is_some());

    // removing leaf 0 blanks nodes 1 and 3
    tree.blank_leaf(LeafIndex(0))?;
    private_tree.sync(&tree, LeafIndex(1));
    assert!(private_tree.get(NodeIndex(1)).is_none());
    assert!(private_tree.get(NodeIndex(3)).is_none());
    assert!(private_tree.get(NodeIndex(2)).is_some());

    let raw = private_tree.serialize_detached()?;
    assert_eq!(PrivateTree::deserialize_exact(&raw)?, private_tree);
    Ok(())
}

#[test]
fn tree_hash_tracks_content() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let members: Vec<_> = ["a", "b", "c"].into_iter().map(member).collect();
    let tree = tree_of(&members);

    let hash = tree.tree_hash(&crypto_provider, SUITE)?;
    assert_eq!(hash.len(), 32);
    assert_eq!(tree.clone().tree_hash(&crypto_provider, SUITE)?, hash);

    let mut changed = tree.clone();
    changed.blank_leaf(LeafIndex(1))?;
    assert_ne!(changed.tree_hash(&crypto_provider, SUITE)?, hash);

    Ok(())
}

#[test]
fn tree_survives_serialization() -> Result<()> {
    let members: Vec<_> = ["a", "b", "c"].into_iter().map(member).collect();
    let tree = tree_of(&members);

    let raw = tree.serialize_detached()?;
    assert_eq!(RatchetTree::deserialize_exact(&raw)?, tree);
    Ok(())
}

#[test]
fn malformed_trees_are_rejected() -> Result<()> {
    let leaf_node = member("a").public.leaf_node().clone();

    let two_slots = RatchetTree(vec![Some(Node::Leaf(leaf_node.clone())), None]);
    assert_eq!(
        RatchetTree::deserialize_exact(two_slots.serialize_detached()?),
        Err(Error::InvalidTreeSize(2))
    );

    let leaf_in_parent_slot = RatchetTree(vec![None, Some(Node::Leaf(leaf_node)), None]);
    assert_eq!(
        RatchetTree::deserialize_exact(leaf_in_parent_slot.serialize_detached()?),
        Err(Error::NodeTypeMismatch)
    );
    Ok(())
}

#[test]
fn unmerged_leaves_must_lie_below_their_parent() -> Result<()> {
    let members: Vec<_> = ["a", "b", "c", "d"].into_iter().map(member).collect();
    let with_unmerged = |leaf: u32| {
        let mut tree = tree_of(&members);
        tree.0[1] = Some(Node::Parent(ParentNode {
            encryption_key: members[0].public.leaf_node().encryption_key().clone(),
            unmerged_leaves: vec![LeafIndex(leaf)],
        }));
        tree.serialize_detached()
    };

    assert!(RatchetTree::deserialize_exact(with_unmerged(1)?).is_ok());
    assert_eq!(
        RatchetTree::deserialize_exact(with_unmerged(2)?),
        Err(Error::InvalidLeafIndex(2))
    );
    assert_eq!(
        RatchetTree::deserialize_exact(with_unmerged(0x8000_0000)?),
        Err(Error::InvalidLeafIndex(0x8000_0000))
    );
    Ok(())
}

#[test]
fn leaves_past_the_tree_are_absent() {
    let members: Vec<_> = ["a", "b"].into_iter().map(member).collect();
    let tree = tree_of(&members);

    assert_eq!(tree.get_leaf(LeafIndex(2)), None);
    assert_eq!(tree.get_leaf(LeafIndex(0x8000_0000)), None);
    assert_eq!(tree.get_leaf(LeafIndex(u32::MAX)), None);
}
