use tls_codec::{Deserialize, Serialize};

use super::*;

#[test]
fn basic_credential_round_trip() {
    let credential: Credential = BasicCredential::new(b"Alice".to_vec()).into();
    assert_eq!(credential.credential_type(), CredentialType::Basic);

    let encoded = credential.tls_serialize_detached().expect("encoding failed");
    // u16 type, one byte length prefix, identity
    assert_eq!(encoded, [0, 1, 5, b'A', b'l', b'i', b'c', b'e']);

    let decoded = Credential::tls_deserialize_exact(&encoded).expect("decoding failed");
    assert_eq!(decoded, credential);
    let basic = BasicCredential::try_from(decoded).expect("not a basic credential");
    assert_eq!(basic.identity(), b"Alice");
}

#[test]
fn unknown_credential_type_is_opaque() {
    let encoded = [0xF0, 0x01, 2, 0xAA, 0xBB];
    let credential = Credential::tls_deserialize_exact(encoded).expect("decoding failed");
    assert_eq!(credential.credential_type(), CredentialType::Other(0xF001));
    assert_eq!(credential.serialized_content(), &[0xAA, 0xBB]);
    assert_eq!(
        credential.tls_serialize_detached().expect("encoding failed"),
        encoded
    );
    assert_eq!(
        BasicCredential::try_from(credential),
        Err(CredentialError::UnexpectedCredentialType)
    );
}
