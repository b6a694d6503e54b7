use bytes::Bytes;

use super::*;
use crate::mls::crypto::credential::Credential;
use crate::mls::crypto::provider::RustCryptoProvider;
use crate::mls::crypto::Secret;
use crate::mls::extensibility::{list::MlsExtension, Extensions, RatchetTreeExtension};
use crate::mls::framing::proposal::RemoveProposal;
use crate::mls::framing::welcome::WelcomeRecipient;
use crate::mls::key_package::KeyPairPackage;
use crate::mls::ratchet_tree::RatchetTree;
use crate::mls::secret_tree::RatchetSecret;

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

fn member(name: &str) -> KeyPairPackage {
    KeyPairPackage::generate(&RustCryptoProvider, SUITE, Credential::basic(name.to_owned()))
        .expect("key package generation")
}

fn group_context(epoch: u64) -> GroupContext {
    GroupContext {
        version: ProtocolVersion::MLS10,
        cipher_suite: SUITE,
        group_id: MlsGroupId::new("framing-group"),
        epoch,
        tree_hash: Bytes::from_static(&[0x11; 32]),
        confirmed_transcript_hash: Bytes::from_static(&[0x22; 32]),
        extensions: Extensions::default(),
    }
}

fn signed(sender: &KeyPairPackage, leaf: u32, content: Content) -> AuthenticatedContent {
    let group_context = group_context(7);
    AuthenticatedContent::new(
        &RustCryptoProvider,
        SUITE,
        &sender.private.signature_key,
        WireFormat::PrivateMessage,
        FramedContent {
            group_id: group_context.group_id.clone(),
            epoch: group_context.epoch,
            sender: Sender::Member(LeafIndex(leaf)),
            authenticated_data: Bytes::from_static(b"aad"),
            content,
        },
        &group_context,
    )
    .expect("signing")
}

fn ratchet_secret(generation: u32) -> RatchetSecret {
    RatchetSecret {
        secret: Secret::new(vec![0x33; 32]),
        generation,
    }
}

#[test]
fn private_message_hides_sender_and_content() {
    let alice = member("alice");
    let auth_content = signed(&alice, 3, Content::Application(Bytes::from_static(b"hi")));
    let sender_data_secret = [0x44u8; 32];

    let message = PrivateMessage::seal(
        &RustCryptoProvider,
        SUITE,
        &auth_content,
        &ratchet_secret(9),
        &sender_data_secret,
        [1, 2, 3, 4],
    )
    .expect("sealing");
    assert_eq!(message.content_type, ContentType::Application);
    assert_eq!(message.epoch, 7);

    let sender_data = message
        .decrypt_sender_data(&RustCryptoProvider, SUITE, &sender_data_secret)
        .expect("sender data decrypts");
    assert_eq!(
        sender_data,
        SenderData {
            leaf_index: LeafIndex(3),
            generation: 9,
            reuse_guard: [1, 2, 3, 4],
        }
    );

    let opened = message
        .decrypt_content(&RustCryptoProvider, SUITE, &ratchet_secret(9), &sender_data)
        .expect("content decrypts");
    assert_eq!(opened, auth_content);
    opened
        .verify_signature(
            &RustCryptoProvider,
            SUITE,
            alice.public.leaf_node().signature_key(),
            &group_context(7),
        )
        .expect("signature verifies");
}

#[test]
fn private_message_binds_its_header() {
    let alice = member("alice");
    let auth_content = signed(&alice, 0, Content::Application(Bytes::from_static(b"hi")));
    let sender_data_secret = [0x44u8; 32];
    let mut message = PrivateMessage::seal(
        &RustCryptoProvider,
        SUITE,
        &auth_content,
        &ratchet_secret(0),
        &sender_data_secret,
        [0; 4],
    )
    .expect("sealing");
    let sender_data = message
        .decrypt_sender_data(&RustCryptoProvider, SUITE, &sender_data_secret)
        .expect("sender data decrypts");

    message.authenticated_data = Bytes::from_static(b"other aad");
    assert_eq!(
        message.decrypt_content(&RustCryptoProvider, SUITE, &ratchet_secret(0), &sender_data),
        Err(Error::AeadDecryptionFailed)
    );

    message.epoch = 8;
    assert_eq!(
        message.decrypt_sender_data(&RustCryptoProvider, SUITE, &sender_data_secret),
        Err(Error::AeadDecryptionFailed)
    );
}

#[test]
fn signature_covers_the_group_context() {
    let alice = member("alice");
    let auth_content = signed(&alice, 0, Content::Application(Bytes::from_static(b"hi")));

    assert_eq!(
        auth_content.verify_signature(
            &RustCryptoProvider,
            SUITE,
            alice.public.leaf_node().signature_key(),
            &group_context(8),
        ),
        Err(Error::SignatureVerificationFailed)
    );
    assert_eq!(
        auth_content.verify_signature(
            &RustCryptoProvider,
            SUITE,
            member("mallory").public.leaf_node().signature_key(),
            &group_context(7),
        ),
        Err(Error::SignatureVerificationFailed)
    );
}

#[test]
fn proposal_refs_identify_the_signed_content() {
    let alice = member("alice");
    let remove = |removed| Content::Proposal(Proposal::Remove(RemoveProposal { removed }));

    let first = signed(&alice, 0, remove(LeafIndex(1)));
    let first_ref = first
        .proposal_ref(&RustCryptoProvider, SUITE)
        .expect("proposal ref");
    assert_eq!(first_ref.len(), 32);
    assert_eq!(
        AuthenticatedContent::deserialize_exact(first.serialize_detached().expect("serializes"))
            .expect("deserializes")
            .proposal_ref(&RustCryptoProvider, SUITE)
            .expect("proposal ref"),
        first_ref
    );

    let second = signed(&alice, 0, remove(LeafIndex(2)));
    assert_ne!(
        second
            .proposal_ref(&RustCryptoProvider, SUITE)
            .expect("proposal ref"),
        first_ref
    );
}

#[test]
fn commit_carries_references_and_inline_proposals() {
    let alice = member("alice");
    let reference = signed(
        &alice,
        0,
        Content::Proposal(Proposal::Remove(RemoveProposal {
            removed: LeafIndex(2),
        })),
    )
    .proposal_ref(&RustCryptoProvider, SUITE)
    .expect("proposal ref");

    let commit = Commit {
        proposals: vec![
            ProposalOrRef::Reference(reference.clone()),
            ProposalOrRef::Proposal(Proposal::Remove(RemoveProposal {
                removed: LeafIndex(3),
            })),
        ],
        path: None,
    };
    let decoded = Commit::deserialize_exact(commit.serialize_detached().expect("serializes"))
        .expect("deserializes");

    assert_eq!(decoded, commit);
    assert_eq!(decoded.proposals()[0], ProposalOrRef::Reference(reference));
    assert!(decoded.path().is_none());
}

#[test]
fn mls_message_rejects_unsupported_framing() {
    // PublicMessage wire format
    assert_eq!(
        MlsMessage::deserialize_exact([0x00, 0x01, 0x00, 0x01]),
        Err(Error::InvalidWireFormat(1))
    );
    assert_eq!(
        MlsMessage::deserialize_exact([0x00, 0x02, 0x00, 0x02]),
        Err(Error::InvalidProtocolVersion(2))
    );

    let key_package = MlsMessage::KeyPackage(member("alice").public);
    let mut bytes = key_package.serialize_detached().expect("serializes").to_vec();
    assert_eq!(
        MlsMessage::deserialize_exact(&bytes).expect("deserializes"),
        key_package
    );
    bytes.extend_from_slice(&[0, 0]);
    assert_eq!(MlsMessage::deserialize_exact(&bytes), Err(Error::TrailingBytes(2)));
}

#[test]
fn welcome_opens_only_for_its_recipients() {
    let alice = member("alice");
    let bob = member("bob");
    let carol = member("carol");

    let tree = RatchetTree::new(alice.public.leaf_node().clone());
    let extensions = vec![MlsExtension::RatchetTree(RatchetTreeExtension::new(tree.clone()))]
        .try_into()
        .expect("extensions encode");
    let group_info = GroupInfo::new(
        &RustCryptoProvider,
        &alice.private.signature_key,
        group_context(1),
        extensions,
        Bytes::from_static(&[0x55; 32]),
        LeafIndex(0),
    )
    .expect("group info signing");

    let joiner_secret = Secret::new(vec![0x66; 32]);
    let psk_secret = Secret::zero(32);
    let path_secret = Secret::new(vec![0x77; 32]);
    let welcome = Welcome::seal(
        &RustCryptoProvider,
        SUITE,
        &joiner_secret,
        &psk_secret,
        &group_info,
        vec![WelcomeRecipient {
            key_package_ref: bob.public.reference(&RustCryptoProvider).expect("reference"),
            init_key: bob.public.init_key().clone(),
            path_secret: Some(path_secret.clone()),
        }],
    )
    .expect("welcome sealing");

    let secrets = welcome
        .decrypt_group_secrets(
            &RustCryptoProvider,
            &bob.public.reference(&RustCryptoProvider).expect("reference"),
            &bob.private.init_key,
        )
        .expect("bob opens his secrets");
    assert_eq!(secrets.joiner_secret, joiner_secret);
    assert_eq!(secrets.path_secret, Some(path_secret));

    assert_eq!(
        welcome.decrypt_group_secrets(
            &RustCryptoProvider,
            &carol.public.reference(&RustCryptoProvider).expect("reference"),
            &carol.private.init_key,
        ),
        Err(Error::WelcomeNotForThisMember)
    );

    let opened = welcome
        .decrypt_group_info(&RustCryptoProvider, &secrets.joiner_secret, &psk_secret)
        .expect("group info decrypts");
    assert_eq!(opened, group_info);
    assert_eq!(opened.ratchet_tree().expect("tree extension"), tree);
    opened
        .verify(&RustCryptoProvider, alice.public.leaf_node().signature_key())
        .expect("group info signature verifies");
    assert_eq!(
        opened.verify(&RustCryptoProvider, bob.public.leaf_node().signature_key()),
        Err(Error::SignatureVerificationFailed)
    );
}

#[test]
fn welcome_needs_a_recipient() {
    let alice = member("alice");
    let group_info = GroupInfo::new(
        &RustCryptoProvider,
        &alice.private.signature_key,
        group_context(1),
        Extensions::default(),
        Bytes::new(),
        LeafIndex(0),
    )
    .expect("group info signing");

    assert_eq!(
        Welcome::seal(
            &RustCryptoProvider,
            SUITE,
            &Secret::zero(32),
            &Secret::zero(32),
            &group_info,
            vec![],
        ),
        Err(Error::NoRecipients)
    );
    assert_eq!(
        group_info.ratchet_tree(),
        Err(Error::MissingRatchetTree)
    );
}

#[test]
fn only_add_update_remove_proposals_decode() {
    assert_eq!(
        Proposal::deserialize_exact([0x00, 0x04]),
        Err(Error::PskNotSupported)
    );
    assert_eq!(
        Proposal::deserialize_exact([0x00, 0x07]),
        Err(Error::InvalidProposalType(7))
    );
}
