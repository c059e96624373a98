use tls_codec::{Deserialize, Serialize};

use super::*;
use crate::{credentials::CredentialType, messages::proposals::ProposalType};

#[test]
fn application_id() {
    let extension = Extension::ApplicationId(ApplicationIdExtension::new(b"test"));
    let encoded = extension
        .tls_serialize_detached()
        .expect("encoding failed");
    // u16 type, one byte length of the data, one byte length of the id, id
    assert_eq!(encoded, [0, 1, 5, 4, b't', b'e', b's', b't']);
    assert_eq!(encoded.len(), extension.tls_serialized_len());

    let decoded = Extension::tls_deserialize_exact(&encoded).expect("decoding failed");
    assert_eq!(decoded, extension);
}

#[test]
fn required_capabilities() {
    let required = RequiredCapabilitiesExtension::new(
        &[ExtensionType::ApplicationId, ExtensionType::Unknown(0xff00)],
        &[ProposalType::Reinit],
        &[CredentialType::Basic],
    );
    let extension = Extension::RequiredCapabilities(required.clone());
    let encoded = extension
        .tls_serialize_detached()
        .expect("encoding failed");
    let decoded = Extension::tls_deserialize_exact(&encoded).expect("decoding failed");
    assert_eq!(decoded, extension);

    let extensions = Extensions::single(decoded);
    assert_eq!(extensions.required_capabilities(), Some(&required));
    assert_eq!(
        extensions
            .required_capabilities()
            .map(|r| r.extension_types().to_vec()),
        Some(vec![
            ExtensionType::ApplicationId,
            ExtensionType::Unknown(0xff00)
        ])
    );
}

#[test]
fn unknown_extensions_round_trip() {
    // Type 0xff01 with three bytes of data.
    let encoded = [0xff, 0x01, 3, 0xAA, 0xBB, 0xCC];
    let extension = Extension::tls_deserialize_exact(encoded).expect("decoding failed");
    assert_eq!(extension.extension_type(), ExtensionType::Unknown(0xff01));
    assert_eq!(
        extension.tls_serialize_detached().expect("encoding failed"),
        encoded
    );

    // External senders are carried as opaque data too.
    let encoded = [0x00, 0x05, 1, 0x00];
    let extension = Extension::tls_deserialize_exact(encoded).expect("decoding failed");
    assert_eq!(extension.extension_type(), ExtensionType::ExternalSenders);
}

#[test]
fn custom_extensions_cannot_use_reserved_types() {
    for reserved in 0..=5 {
        assert_eq!(
            Extension::custom(reserved, vec![]),
            Err(ExtensionError::ReservedExtensionType(reserved))
        );
    }
    let extension = Extension::custom(6, vec![1, 2]).expect("type 6 is not reserved");
    assert_eq!(extension.extension_type(), ExtensionType::Unknown(6));
}

#[test]
fn extension_lists_are_unique() {
    let application_id = Extension::ApplicationId(ApplicationIdExtension::new(b"a"));
    assert_eq!(
        Extensions::from_vec(vec![application_id.clone(), application_id.clone()]),
        Err(ExtensionError::DuplicateExtension(1))
    );

    let mut extensions = Extensions::single(application_id.clone());
    assert_eq!(
        extensions.add(application_id),
        Err(ExtensionError::DuplicateExtension(1))
    );

    extensions.add_or_replace(Extension::ApplicationId(ApplicationIdExtension::new(b"b")));
    assert_eq!(
        extensions.application_id().map(|e| e.as_slice()),
        Some(b"b".as_slice())
    );
    assert_eq!(extensions.iter().count(), 1);
    assert!(extensions.check_unique().is_ok());

    // A decoded list may contain duplicates and is rejected on validation.
    let encoded = [0u8, 1, 2, 1, 0x61, 0, 1, 2, 1, 0x62];
    let mut bytes = vec![encoded.len() as u8];
    bytes.extend_from_slice(&encoded);
    let decoded = Extensions::tls_deserialize_exact(&bytes).expect("decoding failed");
    assert_eq!(
        decoded.check_unique(),
        Err(ExtensionError::DuplicateExtension(1))
    );
}

#[test]
fn group_context_extensions() {
    let extensions = Extensions::single(Extension::RequiredCapabilities(
        RequiredCapabilitiesExtension::default(),
    ));
    assert!(extensions.validate_for_group_context().is_ok());

    let extensions = Extensions::single(Extension::ApplicationId(ApplicationIdExtension::new(
        b"leaf only",
    )));
    assert_eq!(
        extensions.validate_for_group_context(),
        Err(ExtensionError::InvalidExtensionContext(1))
    );
}

#[test]
fn remove_extension() {
    let mut extensions = Extensions::from_vec(vec![
        Extension::ApplicationId(ApplicationIdExtension::new(b"a")),
        Extension::custom(0xff00, vec![7]).expect("not reserved"),
    ])
    .expect("unique extensions");
    assert!(extensions.contains(ExtensionType::Unknown(0xff00)));
    assert_eq!(extensions.unknown(0xff00), Some(&UnknownExtension(vec![7])));

    let removed = extensions.remove(ExtensionType::Unknown(0xff00));
    assert!(removed.is_some());
    assert!(!extensions.contains(ExtensionType::Unknown(0xff00)));
    assert!(extensions.remove(ExtensionType::Unknown(0xff00)).is_none());
    assert!(!extensions.is_empty());
}
