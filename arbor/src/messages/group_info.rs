//! Group info: the signed public description of an epoch that joiners
//! start from.

use arbor_traits::crypto::ArborCrypto;
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{
        signable::{Signable, SignatureError, SignedStruct, Verifiable},
        Ciphersuite, Signature, SignaturePublicKey,
    },
    extensions::Extensions,
    group::{GroupContext, GroupEpoch, GroupId},
    messages::ConfirmationTag,
};

const SIGN_LABEL: &str = "GroupInfoTBS";

/// The signed part of a [`GroupInfo`].
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub(crate) struct GroupInfoTbs {
    group_context: GroupContext,
    extensions: Extensions,
    confirmation_tag: ConfirmationTag,
    signer: LeafNodeIndex,
}

impl GroupInfoTbs {
    pub(crate) fn new(
        group_context: GroupContext,
        extensions: Extensions,
        confirmation_tag: ConfirmationTag,
        signer: LeafNodeIndex,
    ) -> Self {
        Self {
            group_context,
            extensions,
            confirmation_tag,
            signer,
        }
    }

    #[cfg(test)]
    pub(crate) fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

impl Signable for GroupInfoTbs {
    type SignedOutput = GroupInfo;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tls_serialize_detached()
    }

    fn label(&self) -> &str {
        SIGN_LABEL
    }
}

/// The group context of an epoch with the confirmation tag that closed it,
/// signed by the member at `signer`.
///
/// Its own extensions carry what a joiner needs on top of the context, such
/// as the ratchet tree or the external public key.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct GroupInfo {
    tbs: GroupInfoTbs,
    signature: Signature,
}

impl GroupInfo {
    pub fn group_context(&self) -> &GroupContext {
        &self.tbs.group_context
    }

    pub fn group_id(&self) -> &GroupId {
        self.group_context().group_id()
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.group_context().epoch()
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.group_context().ciphersuite()
    }

    /// Extensions of the group info, not those of the context.
    pub fn extensions(&self) -> &Extensions {
        &self.tbs.extensions
    }

    pub fn confirmation_tag(&self) -> &ConfirmationTag {
        &self.tbs.confirmation_tag
    }

    pub fn signer(&self) -> LeafNodeIndex {
        self.tbs.signer
    }

    /// Checks the signature against `signature_key`, which the caller looks
    /// up at [`Self::signer`] in the tree.
    pub(crate) fn verify(
        &self,
        crypto: &impl ArborCrypto,
        signature_key: &SignaturePublicKey,
    ) -> Result<(), SignatureError> {
        Verifiable::verify(self, crypto, self.ciphersuite(), signature_key)
    }

    #[cfg(test)]
    pub(crate) fn payload_mut(&mut self) -> &mut GroupInfoTbs {
        &mut self.tbs
    }
}

impl SignedStruct<GroupInfoTbs> for GroupInfo {
    fn from_payload(tbs: GroupInfoTbs, signature: Signature) -> Self {
        Self { tbs, signature }
    }
}

impl Verifiable for GroupInfo {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tbs.tls_serialize_detached()
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn label(&self) -> &str {
        SIGN_LABEL
    }
}
