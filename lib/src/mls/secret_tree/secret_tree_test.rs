use serde::{Deserialize, Serialize};

use crate::mls::crypto::provider::RustCryptoProvider;
use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider};
use crate::mls::framing::{expand_sender_data_key, expand_sender_data_nonce};
use crate::mls::group::config::SenderRatchetConfiguration;
use crate::mls::secret_tree::*;
use crate::mls::utilities::error::*;
use crate::mls::utilities::serde::serde_test::load_test_vector;
use crate::mls::utilities::serde::{Deserializer, Serializer};
use crate::mls::utilities::tree_math::{LeafIndex, NumLeaves};

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct SenderData {
    #[serde(with = "hex")]
    // `sender_data_secret` is the name of the JSON field
    // we're reading from
    #[allow(clippy::struct_field_names)]
    sender_data_secret: Vec<u8>,
    #[serde(with = "hex")]
    ciphertext: Vec<u8>,
    #[serde(with = "hex")]
    key: Vec<u8>,
    #[serde(with = "hex")]
    nonce: Vec<u8>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct Leaf {
    generation: u32,
    #[serde(with = "hex")]
    handshake_key: Vec<u8>,
    #[serde(with = "hex")]
    handshake_nonce: Vec<u8>,
    #[serde(with = "hex")]
    application_key: Vec<u8>,
    #[serde(with = "hex")]
    application_nonce: Vec<u8>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct SecretTreeTest {
    cipher_suite: u16,
    sender_data: SenderData,
    #[serde(with = "hex")]
    encryption_secret: Vec<u8>,
    leaves: Vec<Vec<Leaf>>,
}

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

#[allow(clippy::cast_possible_truncation)]
fn secret_tree_test(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    tc: &SecretTreeTest,
) -> Result<()> {
    let key = expand_sender_data_key(
        crypto_provider,
        cipher_suite,
        &tc.sender_data.sender_data_secret,
        &tc.sender_data.ciphertext,
    )?;
    assert_eq!(&*key, tc.sender_data.key.as_slice());

    let nonce = expand_sender_data_nonce(
        crypto_provider,
        cipher_suite,
        &tc.sender_data.sender_data_secret,
        &tc.sender_data.ciphertext,
    )?;
    assert_eq!(&*nonce, tc.sender_data.nonce.as_slice());

    let mut tree = SecretTree::new(
        cipher_suite,
        NumLeaves(tc.leaves.len() as u32),
        LeafIndex(0),
        &tc.encryption_secret,
        SenderRatchetConfiguration::default(),
    );

    for (i, gens) in tc.leaves.iter().enumerate() {
        let li = LeafIndex(i as u32);
        for label in [RatchetLabel::Handshake, RatchetLabel::Application] {
            test_ratchet_secret(crypto_provider, cipher_suite, &mut tree, li, label, gens)?;
        }
    }

    Ok(())
}

fn test_ratchet_secret(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    tree: &mut SecretTree,
    li: LeafIndex,
    label: RatchetLabel,
    gens: &[Leaf],
) -> Result<()> {
    for gen in gens {
        let secret = tree.secret_for_generation(crypto_provider, li, label, gen.generation)?;
        assert_eq!(secret.generation(), gen.generation);

        let (want_key, want_nonce) = match label {
            RatchetLabel::Handshake => (&gen.handshake_key, &gen.handshake_nonce),
            RatchetLabel::Application => (&gen.application_key, &gen.application_nonce),
        };

        let key = secret.derive_key(crypto_provider, cipher_suite)?;
        assert_eq!(&*key, want_key.as_slice(), "{li:?} {label:?} key");

        let nonce = secret.derive_nonce(crypto_provider, cipher_suite)?;
        assert_eq!(&*nonce, want_nonce.as_slice(), "{li:?} {label:?} nonce");
    }

    Ok(())
}

#[test]
fn test_secret_tree() -> Result<()> {
    let tests: Vec<SecretTreeTest> = load_test_vector("test-vectors/secret-tree.json");
    let crypto_provider = RustCryptoProvider;

    for tc in &tests {
        let cipher_suite: CipherSuite = tc.cipher_suite.into();
        println!("test_secret_tree {cipher_suite}");
        if crypto_provider.supports(cipher_suite) {
            secret_tree_test(&crypto_provider, cipher_suite, tc)?;
        }
    }

    Ok(())
}

fn four_member_tree() -> SecretTree {
    SecretTree::new(
        SUITE,
        NumLeaves(4),
        LeafIndex(1),
        &[0x42; 32],
        SenderRatchetConfiguration::default(),
    )
}

#[test]
fn consumed_generation_is_rejected() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let mut tree = four_member_tree();

    tree.secret_for_generation(&crypto_provider, LeafIndex(2), RatchetLabel::Application, 0)?;
    assert_eq!(
        tree.secret_for_generation(&crypto_provider, LeafIndex(2), RatchetLabel::Application, 0),
        Err(Error::GenerationAlreadyConsumed(0))
    );

    // the other ratchet of the same leaf is independent
    tree.secret_for_generation(&crypto_provider, LeafIndex(2), RatchetLabel::Handshake, 0)?;
    Ok(())
}

#[test]
fn out_of_order_generations_within_tolerance() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let mut tree = four_member_tree();
    let mut in_order = four_member_tree();

    let mut received = vec![];
    for generation in [4, 2, 0, 3, 1] {
        let secret = tree.secret_for_generation(
            &crypto_provider,
            LeafIndex(3),
            RatchetLabel::Application,
            generation,
        )?;
        assert_eq!(secret.generation(), generation);
        received.push(secret);
    }
    received.sort_by_key(RatchetSecret::generation);

    for want in received {
        let got = in_order.secret_for_generation(
            &crypto_provider,
            LeafIndex(3),
            RatchetLabel::Application,
            want.generation(),
        )?;
        assert_eq!(got, want);
    }

    Ok(())
}

#[test]
fn skipped_generations_beyond_tolerance_are_dropped() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let mut tree = four_member_tree();
    let tolerance = SenderRatchetConfiguration::default().out_of_order_tolerance;

    let jump = tolerance + 3;
    tree.secret_for_generation(&crypto_provider, LeafIndex(0), RatchetLabel::Application, jump)?;

    // only the most recent `tolerance` skipped generations are retained
    assert_eq!(
        tree.secret_for_generation(&crypto_provider, LeafIndex(0), RatchetLabel::Application, 0),
        Err(Error::GenerationAlreadyConsumed(0))
    );
    let kept = tree.secret_for_generation(
        &crypto_provider,
        LeafIndex(0),
        RatchetLabel::Application,
        jump - 1,
    )?;
    assert_eq!(kept.generation(), jump - 1);
    Ok(())
}

#[test]
fn generation_too_far_ahead_is_rejected() {
    let crypto_provider = RustCryptoProvider;
    let mut tree = four_member_tree();
    let distance = SenderRatchetConfiguration::default().maximum_forward_distance;

    assert_eq!(
        tree.secret_for_generation(
            &crypto_provider,
            LeafIndex(2),
            RatchetLabel::Handshake,
            distance + 1
        ),
        Err(Error::GenerationTooFarAhead {
            current: 0,
            generation: distance + 1,
        })
    );
}

#[test]
fn unknown_leaf_is_rejected() {
    let crypto_provider = RustCryptoProvider;
    let mut tree = four_member_tree();

    assert_eq!(
        tree.secret_for_generation(&crypto_provider, LeafIndex(4), RatchetLabel::Handshake, 0),
        Err(Error::InvalidLeafIndex(4))
    );
}

#[test]
fn own_messages_can_be_read_back() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let mut tree = four_member_tree();

    let sent0 = tree.next_sender_secret(&crypto_provider, RatchetLabel::Application)?;
    let sent1 = tree.next_sender_secret(&crypto_provider, RatchetLabel::Application)?;
    assert_eq!(sent0.generation(), 0);
    assert_eq!(sent1.generation(), 1);

    let received1 =
        tree.secret_for_generation(&crypto_provider, LeafIndex(1), RatchetLabel::Application, 1)?;
    let received0 =
        tree.secret_for_generation(&crypto_provider, LeafIndex(1), RatchetLabel::Application, 0)?;
    assert_eq!(received0, sent0);
    assert_eq!(received1, sent1);

    // sending does not depend on what was received
    let sent2 = tree.next_sender_secret(&crypto_provider, RatchetLabel::Application)?;
    assert_eq!(sent2.generation(), 2);
    Ok(())
}

#[test]
fn persisted_tree_continues_where_it_stopped() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let mut tree = four_member_tree();
    let mut peer = SecretTree::new(
        SUITE,
        NumLeaves(4),
        LeafIndex(3),
        &[0x42; 32],
        SenderRatchetConfiguration::default(),
    );

    tree.next_sender_secret(&crypto_provider, RatchetLabel::Handshake)?;
    tree.secret_for_generation(&crypto_provider, LeafIndex(2), RatchetLabel::Application, 3)?;

    let raw = tree.serialize_detached()?;
    let mut restored = SecretTree::deserialize_exact(&raw)?;
    assert_eq!(restored, tree);
    assert_eq!(restored.num_leaves(), NumLeaves(4));

    let sent = restored.next_sender_secret(&crypto_provider, RatchetLabel::Handshake)?;
    assert_eq!(sent.generation(), 1);
    let received =
        peer.secret_for_generation(&crypto_provider, LeafIndex(1), RatchetLabel::Handshake, 1)?;
    assert_eq!(received, sent);

    let retained =
        restored.secret_for_generation(&crypto_provider, LeafIndex(2), RatchetLabel::Application, 1)?;
    assert_eq!(retained.generation(), 1);
    Ok(())
}

#[test]
fn truncated_state_is_rejected() -> Result<()> {
    let raw = four_member_tree().serialize_detached()?;
    assert!(SecretTree::deserialize_exact(&raw[..raw.len() - 1]).is_err());
    Ok(())
}
