//! [RFC9420 Sec.9](https://www.rfc-editor.org/rfc/rfc9420.html#section-9) Secret Tree
//!
//! The secret tree mirrors the ratchet tree. Its root is the epoch's
//! encryption secret and every leaf seeds two hash ratchets, one for
//! handshake and one for application messages. Interior secrets are dropped
//! as soon as both children are derived, and ratchet secrets are dropped as
//! soon as they are used.

#[cfg(test)]
mod secret_tree_test;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::group::config::SenderRatchetConfiguration;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_optional_value, deserialize_u32, deserialize_vector, serialize_optional_value,
    serialize_vector, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::{LeafIndex, NumLeaves};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RatchetLabel {
    Handshake,
    Application,
}

impl RatchetLabel {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            RatchetLabel::Handshake => b"handshake",
            RatchetLabel::Application => b"application",
        }
    }
}

/// One step of a sender ratchet
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RatchetSecret {
    pub(crate) secret: Secret,
    pub(crate) generation: u32,
}

impl RatchetSecret {
    fn derive_tree_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        label: &[u8],
        length: u16,
    ) -> Result<Secret> {
        crypto_provider.expand_with_label(
            cipher_suite,
            &self.secret,
            label,
            &self.generation.to_be_bytes(),
            length,
        )
    }

    pub fn derive_key(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<Secret> {
        let length = crypto_provider.hpke(cipher_suite)?.aead_key_size();
        self.derive_tree_secret(crypto_provider, cipher_suite, b"key", length)
    }

    pub fn derive_nonce(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<Secret> {
        let length = crypto_provider.hpke(cipher_suite)?.aead_nonce_size();
        self.derive_tree_secret(crypto_provider, cipher_suite, b"nonce", length)
    }

    pub fn derive_next(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<RatchetSecret> {
        let generation = self
            .generation
            .checked_add(1)
            .ok_or(Error::GenerationExhausted)?;
        let length = crypto_provider.hpke(cipher_suite)?.kdf_extract_size();
        let secret = self.derive_tree_secret(crypto_provider, cipher_suite, b"secret", length)?;

        Ok(RatchetSecret { secret, generation })
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Deserializer for RatchetSecret {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let secret = Secret::deserialize(buf)?;
        let generation = deserialize_u32(buf)?;
        Ok(Self { secret, generation })
    }
}

impl Serializer for RatchetSecret {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.secret.serialize(buf)?;
        buf.put_u32(self.generation);
        Ok(())
    }
}

/// A hash ratchet plus the secrets of generations skipped over, kept for
/// messages that arrive out of order
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SenderRatchet {
    next: RatchetSecret,
    retained: Vec<RatchetSecret>,
}

impl SenderRatchet {
    fn new(root: Secret) -> Self {
        Self {
            next: RatchetSecret {
                secret: root,
                generation: 0,
            },
            retained: vec![],
        }
    }

    /// The next unused generation
    pub fn generation(&self) -> u32 {
        self.next.generation
    }

    /// Hands out the next generation for sending
    fn advance(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<RatchetSecret> {
        let following = self.next.derive_next(crypto_provider, cipher_suite)?;
        Ok(std::mem::replace(&mut self.next, following))
    }

    /// Hands out `generation` for decryption. Each generation is returned at
    /// most once.
    fn consume(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        generation: u32,
        config: &SenderRatchetConfiguration,
    ) -> Result<RatchetSecret> {
        let current = self.next.generation;
        if generation < current {
            let position = self
                .retained
                .iter()
                .position(|secret| secret.generation == generation)
                .ok_or(Error::GenerationAlreadyConsumed(generation))?;
            return Ok(self.retained.remove(position));
        }
        if generation - current > config.maximum_forward_distance {
            return Err(Error::GenerationTooFarAhead {
                current,
                generation,
            });
        }

        while self.next.generation < generation {
            let skipped = self.advance(crypto_provider, cipher_suite)?;
            self.retained.push(skipped);
        }
        let secret = self.advance(crypto_provider, cipher_suite)?;

        let tolerance = config.out_of_order_tolerance as usize;
        if self.retained.len() > tolerance {
            self.retained.drain(..self.retained.len() - tolerance);
        }

        Ok(secret)
    }
}

impl Deserializer for SenderRatchet {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let next = RatchetSecret::deserialize(buf)?;
        let mut retained = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            retained.push(RatchetSecret::deserialize(b)?);
            Ok(())
        })?;
        Ok(Self { next, retained })
    }
}

impl Serializer for SenderRatchet {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.next.serialize(buf)?;
        serialize_vector(
            self.retained.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.retained[i].serialize(b) },
        )
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct LeafRatchets {
    handshake: SenderRatchet,
    application: SenderRatchet,
}

impl LeafRatchets {
    fn get_mut(&mut self, label: RatchetLabel) -> &mut SenderRatchet {
        match label {
            RatchetLabel::Handshake => &mut self.handshake,
            RatchetLabel::Application => &mut self.application,
        }
    }
}

impl Deserializer for LeafRatchets {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            handshake: SenderRatchet::deserialize(buf)?,
            application: SenderRatchet::deserialize(buf)?,
        })
    }
}

impl Serializer for LeafRatchets {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.handshake.serialize(buf)?;
        self.application.serialize(buf)
    }
}

/// Per-epoch tree of message keys.
///
/// The local member's leaf has two sets of ratchets: one it sends with and
/// one it receives its own messages with, so that it can read back what it
/// sent.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SecretTree {
    cipher_suite: CipherSuite,
    own_leaf: LeafIndex,
    config: SenderRatchetConfiguration,
    nodes: Vec<Option<Secret>>,
    receive: Vec<Option<LeafRatchets>>,
    send: Option<LeafRatchets>,
}

impl SecretTree {
    pub fn new(
        cipher_suite: CipherSuite,
        num_leaves: NumLeaves,
        own_leaf: LeafIndex,
        encryption_secret: &[u8],
        config: SenderRatchetConfiguration,
    ) -> Self {
        let mut nodes = vec![None; num_leaves.width() as usize];
        if let Some(root) = nodes.get_mut(num_leaves.root().as_usize()) {
            *root = Some(Secret::from_slice(encryption_secret));
        }

        Self {
            cipher_suite,
            own_leaf,
            config,
            nodes,
            receive: vec![None; num_leaves.0 as usize],
            send: None,
        }
    }

    #[allow(clippy::cast_possible_truncation)] // receive holds one slot per leaf
    pub fn num_leaves(&self) -> NumLeaves {
        NumLeaves(self.receive.len() as u32)
    }

    pub fn configuration(&self) -> &SenderRatchetConfiguration {
        &self.config
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    pub fn own_leaf(&self) -> LeafIndex {
        self.own_leaf
    }

    /// Walks down from the lowest ancestor of `leaf` whose secret is still
    /// held, splitting every node on the way and dropping it.
    fn derive_leaf_secret(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        leaf: LeafIndex,
    ) -> Result<Secret> {
        let num_leaves = self.num_leaves();
        let target = leaf.node_index();

        let mut node = target;
        while self.nodes[node.as_usize()].is_none() {
            node = num_leaves
                .parent(node)
                .ok_or(Error::InvalidLeafIndex(leaf.0))?;
        }

        let length = crypto_provider.hpke(self.cipher_suite)?.kdf_extract_size();
        while node != target {
            let secret = self.nodes[node.as_usize()]
                .take()
                .ok_or(Error::InvalidNodeIndex(node.0))?;
            let (Some(left), Some(right)) = (node.left(), node.right()) else {
                return Err(Error::InvalidNodeIndex(node.0));
            };
            for (child, label) in [(left, b"left".as_slice()), (right, b"right".as_slice())] {
                let child_secret = crypto_provider.expand_with_label(
                    self.cipher_suite,
                    &secret,
                    b"tree",
                    label,
                    length,
                )?;
                self.nodes[child.as_usize()] = Some(child_secret);
            }
            node = if target.is_in_subtree_of(left) {
                left
            } else {
                right
            };
        }

        self.nodes[target.as_usize()]
            .take()
            .ok_or(Error::InvalidNodeIndex(target.0))
    }

    fn derive_leaf_ratchets(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        leaf: LeafIndex,
    ) -> Result<LeafRatchets> {
        let leaf_secret = self.derive_leaf_secret(crypto_provider, leaf)?;
        let length = crypto_provider.hpke(self.cipher_suite)?.kdf_extract_size();
        let root = |label: RatchetLabel| {
            crypto_provider.expand_with_label(
                self.cipher_suite,
                &leaf_secret,
                label.as_bytes(),
                &[],
                length,
            )
        };

        Ok(LeafRatchets {
            handshake: SenderRatchet::new(root(RatchetLabel::Handshake)?),
            application: SenderRatchet::new(root(RatchetLabel::Application)?),
        })
    }

    /// The receiving ratchets of `leaf`, derived on first use. Deriving the
    /// local member's leaf also seeds its sending ratchets.
    fn leaf_ratchets(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        leaf: LeafIndex,
    ) -> Result<&mut LeafRatchets> {
        let slot = leaf.0 as usize;
        if slot >= self.receive.len() {
            return Err(Error::InvalidLeafIndex(leaf.0));
        }

        if self.receive[slot].is_none() {
            let ratchets = self.derive_leaf_ratchets(crypto_provider, leaf)?;
            if leaf == self.own_leaf {
                self.send = Some(ratchets.clone());
            }
            self.receive[slot] = Some(ratchets);
        }

        self.receive[slot]
            .as_mut()
            .ok_or(Error::InvalidLeafIndex(leaf.0))
    }

    /// Secret for the local member's next outgoing message
    pub(crate) fn next_sender_secret(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        label: RatchetLabel,
    ) -> Result<RatchetSecret> {
        if self.send.is_none() {
            self.leaf_ratchets(crypto_provider, self.own_leaf)?;
        }
        let cipher_suite = self.cipher_suite;
        let send = self
            .send
            .as_mut()
            .ok_or(Error::InvalidLeafIndex(self.own_leaf.0))?;
        send.get_mut(label).advance(crypto_provider, cipher_suite)
    }

    /// Secret for generation `generation` of `sender`. Fails if that
    /// generation was already handed out or has been dropped.
    pub(crate) fn secret_for_generation(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        sender: LeafIndex,
        label: RatchetLabel,
        generation: u32,
    ) -> Result<RatchetSecret> {
        let cipher_suite = self.cipher_suite;
        let config = self.config;
        self.leaf_ratchets(crypto_provider, sender)?
            .get_mut(label)
            .consume(crypto_provider, cipher_suite, generation, &config)
    }
}

impl Deserializer for SecretTree {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let cipher_suite = CipherSuite::deserialize(buf)?;
        let own_leaf = LeafIndex::deserialize(buf)?;
        let config = SenderRatchetConfiguration {
            out_of_order_tolerance: deserialize_u32(buf)?,
            maximum_forward_distance: deserialize_u32(buf)?,
        };

        let mut nodes = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            nodes.push(deserialize_optional_value(b)?);
            Ok(())
        })?;
        let mut receive = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            receive.push(deserialize_optional_value(b)?);
            Ok(())
        })?;
        let send = deserialize_optional_value(buf)?;

        let num_leaves =
            NumLeaves::from_width(nodes.len()).ok_or(Error::InvalidTreeSize(nodes.len()))?;
        if num_leaves.0 as usize != receive.len() || !num_leaves.contains_leaf(own_leaf) {
            return Err(Error::InvalidTreeSize(receive.len()));
        }

        Ok(Self {
            cipher_suite,
            own_leaf,
            config,
            nodes,
            receive,
            send,
        })
    }
}

impl Serializer for SecretTree {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.cipher_suite.serialize(buf)?;
        self.own_leaf.serialize(buf)?;
        buf.put_u32(self.config.out_of_order_tolerance);
        buf.put_u32(self.config.maximum_forward_distance);
        serialize_vector(
            self.nodes.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                serialize_optional_value(self.nodes[i].as_ref(), b)
            },
        )?;
        serialize_vector(
            self.receive.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                serialize_optional_value(self.receive[i].as_ref(), b)
            },
        )?;
        serialize_optional_value(self.send.as_ref(), buf)
    }
}
