use crate::mls::extensibility::{list::MlsExtension, ExtensionType, Extensions};
use crate::mls::utilities::error::{Error, Result};

/// How far a receiver lets a sender's ratchet run ahead, and how many
/// skipped generations it keeps around for late messages
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SenderRatchetConfiguration {
    pub out_of_order_tolerance: u32,
    pub maximum_forward_distance: u32,
}

impl Default for SenderRatchetConfiguration {
    fn default() -> Self {
        Self {
            out_of_order_tolerance: 5,
            maximum_forward_distance: 1000,
        }
    }
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct GroupConfig {
    pub(crate) sender_ratchet_configuration: SenderRatchetConfiguration,
    pub(crate) extensions: Extensions,
}

impl GroupConfig {
    /// Create a group config builder
    pub fn builder() -> GroupConfigBuilder {
        GroupConfigBuilder::new()
    }

    pub fn sender_ratchet_configuration(&self) -> &SenderRatchetConfiguration {
        &self.sender_ratchet_configuration
    }

    /// Group context extensions a new group starts with
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

#[derive(Default, Debug)]
pub struct GroupConfigBuilder {
    sender_ratchet_configuration: SenderRatchetConfiguration,
    extensions: Vec<MlsExtension>,
}

impl GroupConfigBuilder {
    /// Create a group config
    pub fn new() -> Self {
        Self::default()
    }

    /// Build with sender ratchet limits
    #[must_use]
    pub fn with_sender_ratchet_configuration(
        mut self,
        sender_ratchet_configuration: SenderRatchetConfiguration,
    ) -> Self {
        self.sender_ratchet_configuration = sender_ratchet_configuration;
        self
    }

    /// Build with extensions
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<MlsExtension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Finalize and build the group config. The ratchet tree travels in
    /// group info messages only and is refused as a group context extension.
    pub fn build(self) -> Result<GroupConfig> {
        if self
            .extensions
            .iter()
            .any(|extension| matches!(extension, MlsExtension::RatchetTree(_)))
        {
            return Err(Error::UnsupportedExtension(ExtensionType::RatchetTree.into()));
        }

        Ok(GroupConfig {
            sender_ratchet_configuration: self.sender_ratchet_configuration,
            extensions: self.extensions.try_into()?,
        })
    }
}
