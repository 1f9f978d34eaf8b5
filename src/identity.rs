//! Opaque identities and issuance references
//!
//! Holders and parties are named by bech32m strings wrapping an opaque
//! payload. The payload is never interpreted; the checksum is what makes a
//! malformed identity detectable at the API edge. States also arrive through
//! CBOR decoding of stored bytes, which performs no validation, so the
//! wrappers expose `validate` for re-checking at transition time.

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::StateError;

/// Identity commitment of a position holder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OwnerId(String);

/// Identity of an issuing party.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartyId(String);

/// Opaque reference bytes distinguishing issuance events by one party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef(Vec<u8>);

// construct a fresh identity payload under the given human-readable prefix
fn mint(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encoded)
}

fn validate_bech32(field: &'static str, s: &str) -> Result<(), StateError> {
    if s.is_empty() {
        return Err(StateError::InvalidField {
            field,
            reason: "identity is empty".into(),
        });
    }
    bech32::decode(s)
        .map(|_| ())
        .map_err(|e| StateError::InvalidField {
            field,
            reason: e.to_string(),
        })
}

impl OwnerId {
    /// Mint a fresh holder identity, e.g. `OwnerId::generate("owner_")`.
    pub fn generate(hrp: &str) -> anyhow::Result<Self> {
        Ok(Self(mint(hrp)?))
    }

    /// Accept an externally supplied identity, checking the bech32 checksum.
    pub fn parse(s: &str) -> Result<Self, StateError> {
        validate_bech32("owner", s)?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn validate(&self) -> Result<(), StateError> {
        validate_bech32("owner", &self.0)
    }
}

impl PartyId {
    /// Mint a fresh party identity, e.g. `PartyId::generate("party_")`.
    pub fn generate(hrp: &str) -> anyhow::Result<Self> {
        Ok(Self(mint(hrp)?))
    }

    /// Accept an externally supplied identity, checking the bech32 checksum.
    pub fn parse(s: &str) -> Result<Self, StateError> {
        validate_bech32("party", s)?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn validate(&self) -> Result<(), StateError> {
        validate_bech32("party", &self.0)
    }
}

impl IssueRef {
    /// A fresh reference no other issuance event can collide with.
    pub fn generate() -> Self {
        Self(uuid7().as_bytes().to_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn from_hex(s: &str) -> Result<Self, StateError> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| StateError::InvalidField {
                field: "reference",
                reason: e.to_string(),
            })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl<C> minicbor::Encode<C> for OwnerId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for OwnerId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Self(d.str()?.to_string()))
    }
}

impl<C> minicbor::Encode<C> for PartyId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for PartyId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Self(d.str()?.to_string()))
    }
}

impl<C> minicbor::Encode<C> for IssueRef {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for IssueRef {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Self(d.bytes()?.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_id_encoding() {
        let original = OwnerId::generate("owner_").unwrap();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decoded: OwnerId = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn issue_ref_hex_roundtrip() {
        let original = IssueRef::generate();
        let parsed = IssueRef::from_hex(&original.to_hex()).unwrap();

        assert_eq!(original, parsed);
    }

    #[test]
    fn parse_rejects_mangled_checksum() {
        let good = OwnerId::generate("owner_").unwrap();
        let mut mangled = good.as_str().to_string();
        mangled.push('x');

        assert!(OwnerId::parse(&mangled).is_err());
    }
}
