//! Tagged secret payloads carried in `Item.content`
//!
//! The server stores item content as opaque bytes. Clients wrap every secret
//! in an [`Envelope`] (kind tag + the kind's own protobuf encoding) and write
//! the envelope length-delimited, so the outer container stays stable even
//! when a per-kind message grows new fields.

use prost::Message;
use thiserror::Error;

use crate::keeper::envelope::v1::{BinaryInfo, Card, Credentials, Envelope, SecretKind, Text};

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Malformed envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Unknown secret kind tag: {0}")]
    UnknownKind(i32),

    #[error("Envelope followed by {0} trailing bytes")]
    TrailingBytes(usize),
}

/// One stored secret, discriminated by kind
#[derive(Debug, Clone, PartialEq)]
pub enum Secret {
    Credentials(Credentials),
    Text(Text),
    Card(Card),
    /// Metadata of a binary blob; the bytes themselves travel through the
    /// streaming upload and live in the object store.
    Binary(BinaryInfo),
}

impl Secret {
    pub fn kind(&self) -> SecretKind {
        match self {
            Secret::Credentials(_) => SecretKind::Credentials,
            Secret::Text(_) => SecretKind::Text,
            Secret::Card(_) => SecretKind::Card,
            Secret::Binary(_) => SecretKind::Binary,
        }
    }

    /// Serialize into the length-delimited outer container
    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            Secret::Credentials(inner) => inner.encode_to_vec(),
            Secret::Text(inner) => inner.encode_to_vec(),
            Secret::Card(inner) => inner.encode_to_vec(),
            Secret::Binary(inner) => inner.encode_to_vec(),
        };

        Envelope {
            kind: self.kind() as i32,
            payload,
        }
        .encode_length_delimited_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SecretError> {
        let mut buf = bytes;
        let envelope = Envelope::decode_length_delimited(&mut buf)?;
        if !buf.is_empty() {
            return Err(SecretError::TrailingBytes(buf.len()));
        }

        let payload = envelope.payload.as_slice();
        match SecretKind::try_from(envelope.kind) {
            Ok(SecretKind::Credentials) => Ok(Secret::Credentials(Credentials::decode(payload)?)),
            Ok(SecretKind::Text) => Ok(Secret::Text(Text::decode(payload)?)),
            Ok(SecretKind::Card) => Ok(Secret::Card(Card::decode(payload)?)),
            Ok(SecretKind::Binary) => Ok(Secret::Binary(BinaryInfo::decode(payload)?)),
            Ok(SecretKind::Unspecified) | Err(_) => Err(SecretError::UnknownKind(envelope.kind)),
        }
    }
}
