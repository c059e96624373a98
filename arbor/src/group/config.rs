//! # Client configuration
//!
//! [`ClientConfig`] holds the settings a client applies to every group it is
//! a member of. It is not part of the persisted [`ClientState`] and has to be
//! supplied again when a state is restored with
//! [`ClientState::from_json()`].
//!
//! ```
//! use arbor::group::{ClientConfig, PaddingConfig, WireFormatPolicy};
//!
//! let config = ClientConfig::builder()
//!     .padding(PaddingConfig::PadUntilLength(256))
//!     .wire_format_policy(WireFormatPolicy::AlwaysPrivate)
//!     .use_ratchet_tree_extension(true)
//!     .build();
//! assert_eq!(config.padding(), PaddingConfig::PadUntilLength(256));
//! ```
//!
//! [`ClientState`]: super::ClientState
//! [`ClientState::from_json()`]: super::ClientState::from_json

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    credentials::{AcceptAllCredentials, AuthenticationService},
    framing::WireFormat,
    key_packages::Lifetime,
    tree::sender_ratchet::SenderRatchetConfiguration,
    treesync::Capabilities,
};

/// Lifetime of leaf nodes created by a client, in seconds (12 weeks).
const DEFAULT_LEAF_LIFETIME_SECONDS: u64 = 60 * 60 * 24 * 28 * 3;

/// Number of past epochs whose resumption PSK is kept by default.
const DEFAULT_MAX_RESUMPTION_PSKS: usize = 8;

/// How the plaintext of a private message is padded before encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaddingConfig {
    /// No padding.
    #[default]
    None,
    /// Pad with zeros until the plaintext is at least this many bytes long.
    /// Longer plaintexts are not padded.
    PadUntilLength(usize),
    /// Pad every plaintext to exactly this many bytes. Longer plaintexts
    /// cannot be sent.
    AlwaysPad(usize),
}

/// The wire format of outgoing handshake messages. Application messages are
/// always private messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WireFormatPolicy {
    /// Proposals and commits are sent as public messages.
    #[default]
    AlwaysPublic,
    /// Proposals and commits are sent as private messages.
    AlwaysPrivate,
}

impl WireFormatPolicy {
    /// The wire format of outgoing proposals and commits.
    pub(crate) fn handshake_wire_format(&self) -> WireFormat {
        match self {
            WireFormatPolicy::AlwaysPublic => WireFormat::PublicMessage,
            WireFormatPolicy::AlwaysPrivate => WireFormat::PrivateMessage,
        }
    }
}

/// Settings of a client.
#[derive(Clone)]
pub struct ClientConfig {
    padding: PaddingConfig,
    wire_format_policy: WireFormatPolicy,
    sender_ratchet_configuration: SenderRatchetConfiguration,
    use_ratchet_tree_extension: bool,
    max_resumption_psks: usize,
    leaf_lifetime_seconds: u64,
    leaf_capabilities: Capabilities,
    authentication_service: Arc<dyn AuthenticationService>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("padding", &self.padding)
            .field("wire_format_policy", &self.wire_format_policy)
            .field(
                "sender_ratchet_configuration",
                &self.sender_ratchet_configuration,
            )
            .field("use_ratchet_tree_extension", &self.use_ratchet_tree_extension)
            .field("max_resumption_psks", &self.max_resumption_psks)
            .field("leaf_lifetime_seconds", &self.leaf_lifetime_seconds)
            .field("leaf_capabilities", &self.leaf_capabilities)
            .finish_non_exhaustive()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            padding: PaddingConfig::default(),
            wire_format_policy: WireFormatPolicy::default(),
            sender_ratchet_configuration: SenderRatchetConfiguration::default(),
            use_ratchet_tree_extension: false,
            max_resumption_psks: DEFAULT_MAX_RESUMPTION_PSKS,
            leaf_lifetime_seconds: DEFAULT_LEAF_LIFETIME_SECONDS,
            leaf_capabilities: Capabilities::default(),
            authentication_service: Arc::new(AcceptAllCredentials),
        }
    }
}

impl ClientConfig {
    /// Returns a builder for [`ClientConfig`].
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// The padding of private messages.
    pub fn padding(&self) -> PaddingConfig {
        self.padding
    }

    /// The wire format policy for handshake messages.
    pub fn wire_format_policy(&self) -> WireFormatPolicy {
        self.wire_format_policy
    }

    /// How far message generations may be out of order or skipped.
    pub fn sender_ratchet_configuration(&self) -> &SenderRatchetConfiguration {
        &self.sender_ratchet_configuration
    }

    /// Whether welcomes and group infos carry the ratchet tree.
    pub fn use_ratchet_tree_extension(&self) -> bool {
        self.use_ratchet_tree_extension
    }

    /// Number of past epochs whose resumption PSK is kept.
    pub fn max_resumption_psks(&self) -> usize {
        self.max_resumption_psks
    }

    /// The capabilities advertised in leaf nodes this client creates.
    pub fn leaf_capabilities(&self) -> &Capabilities {
        &self.leaf_capabilities
    }

    /// The credential validation used for every leaf node entering a group.
    pub fn authentication_service(&self) -> &dyn AuthenticationService {
        self.authentication_service.as_ref()
    }

    /// A lifetime starting now for a leaf node created by this client.
    pub(crate) fn leaf_lifetime(&self) -> Lifetime {
        Lifetime::new(self.leaf_lifetime_seconds)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// A builder starting from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the padding of private messages.
    pub fn padding(mut self, padding: PaddingConfig) -> Self {
        self.config.padding = padding;
        self
    }

    /// Sets the wire format policy for handshake messages.
    pub fn wire_format_policy(mut self, wire_format_policy: WireFormatPolicy) -> Self {
        self.config.wire_format_policy = wire_format_policy;
        self
    }

    /// Sets the sender ratchet configuration.
    pub fn sender_ratchet_configuration(
        mut self,
        sender_ratchet_configuration: SenderRatchetConfiguration,
    ) -> Self {
        self.config.sender_ratchet_configuration = sender_ratchet_configuration;
        self
    }

    /// Sets whether welcomes and group infos carry the ratchet tree.
    pub fn use_ratchet_tree_extension(mut self, use_ratchet_tree_extension: bool) -> Self {
        self.config.use_ratchet_tree_extension = use_ratchet_tree_extension;
        self
    }

    /// Sets the number of past epochs whose resumption PSK is kept.
    pub fn max_resumption_psks(mut self, max_resumption_psks: usize) -> Self {
        self.config.max_resumption_psks = max_resumption_psks;
        self
    }

    /// Sets the lifetime of created leaf nodes in seconds.
    pub fn leaf_lifetime(mut self, seconds: u64) -> Self {
        self.config.leaf_lifetime_seconds = seconds;
        self
    }

    /// Sets the capabilities advertised in created leaf nodes.
    pub fn leaf_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.config.leaf_capabilities = capabilities;
        self
    }

    /// Sets the authentication service.
    pub fn authentication_service(
        mut self,
        authentication_service: Arc<dyn AuthenticationService>,
    ) -> Self {
        self.config.authentication_service = authentication_service;
        self
    }

    /// Build the [`ClientConfig`].
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
