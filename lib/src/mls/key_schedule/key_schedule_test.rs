use super::*;
use crate::mls::crypto::provider::RustCryptoProvider;
use crate::mls::framing::{Content, Sender};
use crate::mls::utilities::tree_math::LeafIndex;

const SUITE: CipherSuite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

fn group_context(epoch: u64) -> GroupContext {
    GroupContext {
        version: ProtocolVersion::MLS10,
        cipher_suite: SUITE,
        group_id: MlsGroupId::new("key-schedule"),
        epoch,
        tree_hash: Bytes::from_static(&[0xaa; 32]),
        confirmed_transcript_hash: Bytes::new(),
        extensions: Extensions::default(),
    }
}

fn epoch_zero() -> Result<KeySchedule> {
    let context = group_context(0);
    let joiner_secret =
        context.extract_joiner_secret(&RustCryptoProvider, &[0x01; 32], &[0x00; 32])?;
    KeySchedule::from_joiner_secret(
        &RustCryptoProvider,
        &joiner_secret,
        zero_psk_secret(&RustCryptoProvider, SUITE)?,
        &context,
    )
}

#[test]
fn group_context_encoding_is_stable() -> Result<()> {
    let context = group_context(3);
    let bytes = context.serialize_detached()?;

    // version, suite, then the group id with its one-byte length prefix
    assert_eq!(&bytes[..4], &[0x00, 0x01, 0x00, 0x01]);
    assert_eq!(bytes[4] as usize, b"key-schedule".len());
    assert_eq!(GroupContext::deserialize_exact(&bytes)?, context);

    Ok(())
}

#[test]
fn schedule_is_deterministic() -> Result<()> {
    let first = epoch_zero()?;
    let second = epoch_zero()?;
    assert_eq!(first, second);

    assert_eq!(first.epoch_secret.len(), 32);
    assert_eq!(first.psk_secret, Secret::zero(32));
    assert_ne!(first.init_secret, first.epoch_secret);

    Ok(())
}

#[test]
fn advance_replaces_every_secret() -> Result<()> {
    let current = epoch_zero()?;
    let commit_secret = Secret::new(vec![0x42; 32]);

    let (next, joiner_secret) =
        current.advance(&RustCryptoProvider, &commit_secret, &group_context(1))?;
    assert_ne!(next.epoch_secret, current.epoch_secret);
    assert_ne!(next.init_secret, current.init_secret);
    assert_ne!(joiner_secret, next.epoch_secret);

    // a joiner with only the joiner secret lands in the same epoch
    let joined = KeySchedule::from_joiner_secret(
        &RustCryptoProvider,
        &joiner_secret,
        zero_psk_secret(&RustCryptoProvider, SUITE)?,
        &group_context(1),
    )?;
    assert_eq!(joined, next);

    let (other, _) = current.advance(
        &RustCryptoProvider,
        &Secret::new(vec![0x43; 32]),
        &group_context(1),
    )?;
    assert_ne!(other.epoch_secret, next.epoch_secret);

    let (other, _) = current.advance(&RustCryptoProvider, &commit_secret, &group_context(2))?;
    assert_ne!(other.epoch_secret, next.epoch_secret, "context is bound in");

    Ok(())
}

#[test]
fn epoch_secrets_are_distinct() -> Result<()> {
    let secrets = epoch_zero()?.epoch_secrets(&RustCryptoProvider, SUITE)?;

    assert_ne!(secrets.sender_data_secret, secrets.encryption_secret);
    assert_ne!(secrets.encryption_secret, secrets.confirmation_key);
    assert_ne!(secrets.sender_data_secret, secrets.confirmation_key);

    Ok(())
}

#[test]
fn welcome_secret_differs_from_epoch_secret() -> Result<()> {
    let context = group_context(1);
    let joiner_secret =
        context.extract_joiner_secret(&RustCryptoProvider, &[0x01; 32], &[0x02; 32])?;
    let psk_secret = zero_psk_secret(&RustCryptoProvider, SUITE)?;

    let welcome_secret =
        extract_welcome_secret(&RustCryptoProvider, SUITE, &joiner_secret, &psk_secret)?;
    let epoch_secret =
        context.extract_epoch_secret(&RustCryptoProvider, &joiner_secret, &psk_secret)?;
    assert_eq!(welcome_secret.len(), 32);
    assert_ne!(welcome_secret, epoch_secret);

    Ok(())
}

#[test]
fn exporter_honours_label_context_and_length() -> Result<()> {
    let schedule = epoch_zero()?;
    let export = |label: &[u8], context: &[u8], length| {
        schedule.export(&RustCryptoProvider, SUITE, label, context, length)
    };

    let base = export(b"label", b"context", 32)?;
    assert_eq!(base.len(), 32);
    assert_eq!(export(b"label", b"context", 32)?, base);
    assert_ne!(export(b"other", b"context", 32)?, base);
    assert_ne!(export(b"label", b"other", 32)?, base);
    assert_eq!(export(b"label", b"context", 64)?.len(), 64);

    Ok(())
}

#[test]
fn transcript_hashes_chain() -> Result<()> {
    let input = ConfirmedTranscriptHashInput {
        wire_format: WireFormat::PrivateMessage,
        content: FramedContent {
            group_id: MlsGroupId::new("key-schedule"),
            epoch: 0,
            sender: Sender::Member(LeafIndex(0)),
            authenticated_data: Bytes::new(),
            content: Content::Application(Bytes::from_static(b"not a commit")),
        },
        signature: Bytes::from_static(&[0x05; 64]),
    };

    let confirmed = input.hash(&RustCryptoProvider, SUITE, &[])?;
    assert_eq!(confirmed.len(), 32);
    assert_ne!(input.hash(&RustCryptoProvider, SUITE, &[0x01; 32])?, confirmed);

    let interim = InterimTranscriptHashInput {
        confirmation_tag: Bytes::from_static(&[0x06; 32]),
    };
    let next = interim.hash(&RustCryptoProvider, SUITE, &confirmed)?;
    assert_ne!(next, confirmed);
    assert_ne!(interim.hash(&RustCryptoProvider, SUITE, &[])?, next);

    Ok(())
}
