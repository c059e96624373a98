//! Framed content and its authentication.
//!
//! ```text
//! struct {
//!     opaque group_id<V>;
//!     uint64 epoch;
//!     Sender sender;
//!     opaque authenticated_data<V>;
//!
//!     ContentType content_type;
//!     select (FramedContent.content_type) {
//!         case application:
//!           opaque application_data<V>;
//!         case proposal:
//!           Proposal proposal;
//!         case commit:
//!           Commit commit;
//!     };
//! } FramedContent;
//!
//! struct {
//!     ProtocolVersion version = mls10;
//!     WireFormat wire_format;
//!     FramedContent content;
//!     select (FramedContentTBS.content.sender.sender_type) {
//!         case member:
//!         case new_member_commit:
//!             GroupContext context;
//!         case external:
//!         case new_member_proposal:
//!             struct{};
//!     };
//! } FramedContentTBS;
//!
//! struct {
//!     /* SignWithLabel(., "FramedContentTBS", FramedContentTBS) */
//!     opaque signature<V>;
//!     select (FramedContent.content_type) {
//!         case commit:
//!             MAC confirmation_tag;
//!         case application:
//!         case proposal:
//!             struct{};
//!     };
//! } FramedContentAuthData;
//!
//! struct {
//!     WireFormat wire_format;
//!     FramedContent content;
//!     FramedContentAuthData auth;
//! } AuthenticatedContent;
//! ```

use std::io::{Read, Write};

use arbor_traits::{crypto::ArborCrypto, signatures::Signer};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size, TlsDeserialize,
    TlsSerialize, TlsSize, VLBytes,
};

use super::{ContentType, Sender, WireFormat};
use crate::{
    ciphersuite::{
        signable::{Signable, SignatureError, SignedStruct, Verifiable},
        Ciphersuite, Signature, SignaturePublicKey,
    },
    error::LibraryError,
    group::{GroupContext, GroupEpoch, GroupId},
    messages::{proposals::Proposal, Commit, ConfirmationTag},
    versions::ProtocolVersion,
};

const SIGNATURE_FRAMED_CONTENT_LABEL: &str = "FramedContentTBS";

/// The body of a framed message.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, PartialEq, Eq, Clone, TlsSerialize, TlsDeserialize, TlsSize)]
#[repr(u8)]
pub enum FramedContentBody {
    /// Application data
    #[tls_codec(discriminant = 1)]
    Application(VLBytes),
    /// A proposal
    #[tls_codec(discriminant = 2)]
    Proposal(Proposal),
    /// A commit
    #[tls_codec(discriminant = 3)]
    Commit(Commit),
}

impl FramedContentBody {
    /// The content type of this body.
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Application(_) => ContentType::Application,
            Self::Proposal(_) => ContentType::Proposal,
            Self::Commit(_) => ContentType::Commit,
        }
    }

    pub(super) fn serialized_len_without_type(&self) -> usize {
        match self {
            Self::Application(bytes) => bytes.tls_serialized_len(),
            Self::Proposal(proposal) => proposal.tls_serialized_len(),
            Self::Commit(commit) => commit.tls_serialized_len(),
        }
    }

    /// Serialize the body without the leading content type. This is how the
    /// body appears inside the ciphertext of a private message.
    pub(super) fn serialize_without_type<W: Write>(
        &self,
        writer: &mut W,
    ) -> Result<usize, tls_codec::Error> {
        match self {
            Self::Application(bytes) => bytes.tls_serialize(writer),
            Self::Proposal(proposal) => proposal.tls_serialize(writer),
            Self::Commit(commit) => commit.tls_serialize(writer),
        }
    }

    pub(super) fn deserialize_without_type<R: Read>(
        bytes: &mut R,
        content_type: ContentType,
    ) -> Result<Self, tls_codec::Error> {
        Ok(match content_type {
            ContentType::Application => Self::Application(VLBytes::tls_deserialize(bytes)?),
            ContentType::Proposal => Self::Proposal(Proposal::tls_deserialize(bytes)?),
            ContentType::Commit => Self::Commit(Commit::tls_deserialize(bytes)?),
        })
    }
}

/// The content of a message before it is authenticated.
#[derive(Debug, PartialEq, Eq, Clone, TlsSerialize, TlsDeserialize, TlsSize)]
pub struct FramedContent {
    pub(crate) group_id: GroupId,
    pub(crate) epoch: GroupEpoch,
    pub(crate) sender: Sender,
    pub(crate) authenticated_data: VLBytes,
    pub(crate) body: FramedContentBody,
}

impl FramedContent {
    pub(crate) fn new(
        group_context: &GroupContext,
        sender: Sender,
        authenticated_data: &[u8],
        body: FramedContentBody,
    ) -> Self {
        Self {
            group_id: group_context.group_id().clone(),
            epoch: group_context.epoch(),
            sender,
            authenticated_data: authenticated_data.into(),
            body,
        }
    }

    /// The group this content belongs to.
    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// The epoch this content was created in.
    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    /// The sender of this content.
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// The authenticated data.
    pub fn authenticated_data(&self) -> &[u8] {
        self.authenticated_data.as_slice()
    }

    /// The body of the content.
    pub fn body(&self) -> &FramedContentBody {
        &self.body
    }

    /// The content type of the body.
    pub fn content_type(&self) -> ContentType {
        self.body.content_type()
    }
}

/// The authentication data of framed content.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct FramedContentAuthData {
    pub(crate) signature: Signature,
    pub(crate) confirmation_tag: Option<ConfirmationTag>,
}

impl FramedContentAuthData {
    /// Deserialize the authentication data of content of `content_type`.
    /// Only commits carry a confirmation tag.
    pub(super) fn deserialize<R: Read>(
        bytes: &mut R,
        content_type: ContentType,
    ) -> Result<Self, tls_codec::Error> {
        let signature = Signature::tls_deserialize(bytes)?;
        let confirmation_tag = if matches!(content_type, ContentType::Commit) {
            Some(ConfirmationTag::tls_deserialize(bytes)?)
        } else {
            None
        };
        Ok(Self {
            signature,
            confirmation_tag,
        })
    }
}

impl Size for FramedContentAuthData {
    fn tls_serialized_len(&self) -> usize {
        self.signature.tls_serialized_len()
            + self
                .confirmation_tag
                .as_ref()
                .map(|tag| tag.tls_serialized_len())
                .unwrap_or(0)
    }
}

impl TlsSerializeTrait for FramedContentAuthData {
    fn tls_serialize<W: Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let mut written = self.signature.tls_serialize(writer)?;
        if let Some(confirmation_tag) = &self.confirmation_tag {
            written += confirmation_tag.tls_serialize(writer)?;
        }
        Ok(written)
    }
}

/// Serialize `FramedContentTBS`. The group context is written if and only if
/// `serialized_context` is given.
pub(super) fn framed_content_tbs(
    wire_format: WireFormat,
    content: &FramedContent,
    serialized_context: Option<&[u8]>,
) -> Result<Vec<u8>, tls_codec::Error> {
    let mut out = Vec::with_capacity(
        ProtocolVersion::Mls10.tls_serialized_len()
            + wire_format.tls_serialized_len()
            + content.tls_serialized_len()
            + serialized_context.map(|c| c.len()).unwrap_or(0),
    );
    ProtocolVersion::Mls10.tls_serialize(&mut out)?;
    wire_format.tls_serialize(&mut out)?;
    content.tls_serialize(&mut out)?;
    if let Some(context) = serialized_context {
        // The context is already encoded and is not length prefixed here.
        out.write_all(context)
            .map_err(|_| tls_codec::Error::EncodingError("Failed to write context.".into()))?;
    }
    Ok(out)
}

/// Framed content to be signed.
#[derive(Debug, Clone)]
pub(crate) struct FramedContentTbs {
    wire_format: WireFormat,
    content: FramedContent,
    serialized_context: Option<Vec<u8>>,
}

impl FramedContentTbs {
    pub(crate) fn new(
        wire_format: WireFormat,
        content: FramedContent,
        group_context: &GroupContext,
    ) -> Result<Self, LibraryError> {
        let serialized_context = if content.sender.signs_group_context() {
            Some(
                group_context
                    .tls_serialize_detached()
                    .map_err(LibraryError::missing_bound_check)?,
            )
        } else {
            None
        };
        Ok(Self {
            wire_format,
            content,
            serialized_context,
        })
    }
}

impl Signable for FramedContentTbs {
    type SignedOutput = AuthenticatedContent;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        framed_content_tbs(
            self.wire_format,
            &self.content,
            self.serialized_context.as_deref(),
        )
    }

    fn label(&self) -> &str {
        SIGNATURE_FRAMED_CONTENT_LABEL
    }
}

/// Signed framed content together with the wire format it is sent in.
///
/// Commits additionally carry a confirmation tag, which is set after the
/// signature because it depends on the transcript hash over the signature.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AuthenticatedContent {
    pub(crate) wire_format: WireFormat,
    pub(crate) content: FramedContent,
    pub(crate) auth: FramedContentAuthData,
}

impl SignedStruct<FramedContentTbs> for AuthenticatedContent {
    fn from_payload(tbs: FramedContentTbs, signature: Signature) -> Self {
        Self {
            wire_format: tbs.wire_format,
            content: tbs.content,
            auth: FramedContentAuthData {
                signature,
                confirmation_tag: None,
            },
        }
    }
}

impl AuthenticatedContent {
    /// Frame and sign `body`.
    pub(crate) fn new_and_sign(
        wire_format: WireFormat,
        sender: Sender,
        authenticated_data: &[u8],
        body: FramedContentBody,
        group_context: &GroupContext,
        signer: &impl Signer,
    ) -> Result<Self, SignatureError> {
        let content = FramedContent::new(group_context, sender, authenticated_data, body);
        FramedContentTbs::new(wire_format, content, group_context)?.sign(signer)
    }

    pub(crate) fn from_parts(
        wire_format: WireFormat,
        content: FramedContent,
        auth: FramedContentAuthData,
    ) -> Self {
        Self {
            wire_format,
            content,
            auth,
        }
    }

    /// The wire format the content was sent in.
    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    /// The framed content.
    pub fn content(&self) -> &FramedContent {
        &self.content
    }

    /// The sender.
    pub fn sender(&self) -> &Sender {
        &self.content.sender
    }

    /// The epoch.
    pub fn epoch(&self) -> GroupEpoch {
        self.content.epoch
    }

    /// The signature over the content.
    pub fn signature(&self) -> &Signature {
        &self.auth.signature
    }

    /// The confirmation tag, only present for commits.
    pub fn confirmation_tag(&self) -> Option<&ConfirmationTag> {
        self.auth.confirmation_tag.as_ref()
    }

    pub(crate) fn set_confirmation_tag(&mut self, confirmation_tag: ConfirmationTag) {
        self.auth.confirmation_tag = Some(confirmation_tag);
    }

    /// Verify the signature with the sender's signature key. The group context
    /// is only used for senders that sign it.
    pub(crate) fn verify(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        signature_key: &SignaturePublicKey,
        group_context: &GroupContext,
    ) -> Result<(), SignatureError> {
        let serialized_context = if self.content.sender.signs_group_context() {
            Some(
                group_context
                    .tls_serialize_detached()
                    .map_err(LibraryError::missing_bound_check)?,
            )
        } else {
            None
        };
        let payload = framed_content_tbs(
            self.wire_format,
            &self.content,
            serialized_context.as_deref(),
        )
        .map_err(LibraryError::missing_bound_check)?;
        VerifiableContent {
            payload,
            signature: &self.auth.signature,
        }
        .verify(crypto, ciphersuite, signature_key)
    }

    /// ```text
    /// struct {
    ///     WireFormat wire_format;
    ///     FramedContent content; /* with content_type == commit */
    ///     opaque signature<V>;
    /// } ConfirmedTranscriptHashInput;
    /// ```
    pub(crate) fn confirmed_transcript_hash_input(&self) -> Result<Vec<u8>, tls_codec::Error> {
        let mut out = Vec::new();
        self.wire_format.tls_serialize(&mut out)?;
        self.content.tls_serialize(&mut out)?;
        self.auth.signature.tls_serialize(&mut out)?;
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn content_mut(&mut self) -> &mut FramedContent {
        &mut self.content
    }

    #[cfg(test)]
    pub(crate) fn signature_mut(&mut self) -> &mut Signature {
        &mut self.auth.signature
    }
}

impl Size for AuthenticatedContent {
    fn tls_serialized_len(&self) -> usize {
        self.wire_format.tls_serialized_len()
            + self.content.tls_serialized_len()
            + self.auth.tls_serialized_len()
    }
}

impl TlsSerializeTrait for AuthenticatedContent {
    fn tls_serialize<W: Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let mut written = self.wire_format.tls_serialize(writer)?;
        written += self.content.tls_serialize(writer)?;
        written += self.auth.tls_serialize(writer)?;
        Ok(written)
    }
}

impl TlsDeserializeTrait for AuthenticatedContent {
    fn tls_deserialize<R: Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let wire_format = WireFormat::tls_deserialize(bytes)?;
        let content = FramedContent::tls_deserialize(bytes)?;
        let auth = FramedContentAuthData::deserialize(bytes, content.content_type())?;
        Ok(Self {
            wire_format,
            content,
            auth,
        })
    }
}

struct VerifiableContent<'a> {
    payload: Vec<u8>,
    signature: &'a Signature,
}

impl Verifiable for VerifiableContent<'_> {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        Ok(self.payload.clone())
    }

    fn signature(&self) -> &Signature {
        self.signature
    }

    fn label(&self) -> &str {
        SIGNATURE_FRAMED_CONTENT_LABEL
    }
}
