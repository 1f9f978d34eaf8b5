//! Immutable share position state and its pure field transitions
//!
//! A [`PositionState`] is one version of a position. It is never mutated;
//! each `with_*` operation copies the current value, applies exactly one
//! field change, and hands back a fresh state for the ledger to chain. Two
//! structurally identical states compare equal and hash to the same content
//! id, no matter how they were produced.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Invariant, StateError};
use crate::identity::{IssueRef, OwnerId, PartyId};

/// Longest symbol accepted for a position's underlying instrument.
pub const MAX_TICKER_LEN: usize = 12;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    #[n(0)]
    USD,
    #[n(1)]
    GBP,
    #[n(2)]
    EUR,
}

/// Nominal value backing one unit of the instrument.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct FaceValue {
    #[n(0)]
    pub amount: u64,
    #[n(1)]
    pub currency: Currency,
    #[n(2)]
    pub issuer: PartyId,
}

/// Issuing party plus the opaque reference naming one issuance event.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    #[n(0)]
    pub party: PartyId,
    #[n(1)]
    pub reference: IssueRef,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone + Eq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

/// One version of a share position within its lineage.
///
/// Fields are private so the only ways to obtain a state are draft
/// finalisation and the transition operations, which uphold the field-level
/// rules. Chain placement (`version`, `predecessor`) belongs to the ledger.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PositionState {
    #[n(0)]
    owner: OwnerId,
    #[n(1)]
    issuance: Issuance,
    #[n(2)]
    face_value: FaceValue,
    #[n(3)]
    maturity_date: TimeStamp<Utc>,
    #[n(4)]
    qty: i64,
    #[n(5)]
    ticker: String,
    #[n(6)]
    version: u64,
    #[n(7)]
    predecessor: Option<String>,
}

impl PositionState {
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }
    pub fn issuance(&self) -> &Issuance {
        &self.issuance
    }
    pub fn face_value(&self) -> &FaceValue {
        &self.face_value
    }
    pub fn maturity_date(&self) -> &TimeStamp<Utc> {
        &self.maturity_date
    }
    pub fn qty(&self) -> i64 {
        self.qty
    }
    pub fn ticker(&self) -> &str {
        &self.ticker
    }
    /// Position within the lineage; 0 is the issuance version.
    pub fn version(&self) -> u64 {
        self.version
    }
    /// Content id of the superseded version; `None` only at version 0.
    pub fn predecessor(&self) -> Option<&str> {
        self.predecessor.as_deref()
    }

    /// Replace the holder. The identity is re-checked because states can be
    /// decoded from stored bytes without validation.
    pub fn with_owner(&self, new_owner: OwnerId) -> Result<Self, StateError> {
        new_owner.validate()?;
        Ok(Self {
            owner: new_owner,
            ..self.clone()
        })
    }

    /// Replace the issuance pair. The lineage key is fixed at issue time and
    /// is not affected by this transition.
    pub fn with_issuance(&self, new_issuance: Issuance) -> Result<Self, StateError> {
        new_issuance.party.validate()?;
        Ok(Self {
            issuance: new_issuance,
            ..self.clone()
        })
    }

    /// Replace the face value. The currency is part of the instrument's
    /// identity; changing it means a new instrument, never a transition.
    pub fn with_face_value(&self, new_face_value: FaceValue) -> Result<Self, StateError> {
        new_face_value.issuer.validate()?;
        if new_face_value.currency != self.face_value.currency {
            return Err(StateError::InvariantViolation(Invariant::CurrencyImmutable));
        }
        Ok(Self {
            face_value: new_face_value,
            ..self.clone()
        })
    }

    /// Push the maturity date forward. Moving it back would reissue the
    /// instrument, which is forbidden.
    pub fn with_maturity_date(&self, new_maturity_date: TimeStamp<Utc>) -> Result<Self, StateError> {
        if new_maturity_date < self.maturity_date {
            return Err(StateError::InvariantViolation(Invariant::MaturityMonotonic));
        }
        Ok(Self {
            maturity_date: new_maturity_date,
            ..self.clone()
        })
    }

    /// Replace the unit count. Zero or negative holdings are not a state;
    /// full disposal is expressed by terminating the lineage.
    pub fn with_qty(&self, new_qty: i64) -> Result<Self, StateError> {
        if new_qty <= 0 {
            return Err(StateError::InvariantViolation(Invariant::PositiveQuantity));
        }
        Ok(Self {
            qty: new_qty,
            ..self.clone()
        })
    }

    pub fn with_ticker(&self, new_ticker: &str) -> Result<Self, StateError> {
        validate_ticker(new_ticker)?;
        Ok(Self {
            ticker: new_ticker.to_string(),
            ..self.clone()
        })
    }

    /// Encode to CBOR and derive the content hash that identifies this
    /// version in the store.
    pub fn encode_hashed(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }

    // chain placement is stamped by the ledger once a transition is accepted
    pub(crate) fn as_successor(mut self, version: u64, predecessor: String) -> Self {
        self.version = version;
        self.predecessor = Some(predecessor);
        self
    }
}

pub(crate) fn validate_ticker(ticker: &str) -> Result<(), StateError> {
    if ticker.is_empty() {
        return Err(StateError::InvalidField {
            field: "ticker",
            reason: "symbol is empty".into(),
        });
    }
    if ticker.len() > MAX_TICKER_LEN {
        return Err(StateError::InvalidField {
            field: "ticker",
            reason: format!("symbol exceeds {MAX_TICKER_LEN} characters"),
        });
    }
    Ok(())
}

/// Draft of an issuance, built up field by field. Becomes the version 0
/// state once every field is present and valid.
#[derive(Debug, Default)]
pub struct PositionDraft {
    owner: Option<OwnerId>,
    issuance: Option<Issuance>,
    face_value: Option<FaceValue>,
    maturity_date: Option<TimeStamp<Utc>>,
    qty: i64,
    ticker: Option<String>,
}

impl PositionDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }
    pub fn set_issuance(mut self, issuance: Issuance) -> Self {
        self.issuance = Some(issuance);
        self
    }
    pub fn set_face_value(mut self, face_value: FaceValue) -> Self {
        self.face_value = Some(face_value);
        self
    }
    pub fn set_maturity_date(mut self, maturity_date: TimeStamp<Utc>) -> Self {
        self.maturity_date = Some(maturity_date);
        self
    }
    pub fn set_qty(mut self, qty: i64) -> Self {
        self.qty = qty;
        self
    }
    pub fn set_ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.to_string());
        self
    }

    /// Check every field and produce the version 0 state with no
    /// predecessor.
    pub fn validate_and_finalise(self) -> Result<PositionState, StateError> {
        let owner = self.owner.ok_or(missing("owner"))?;
        owner.validate()?;

        let issuance = self.issuance.ok_or(missing("issuance"))?;
        issuance.party.validate()?;

        let face_value = self.face_value.ok_or(missing("face value"))?;
        face_value.issuer.validate()?;

        let maturity_date = self.maturity_date.ok_or(missing("maturity date"))?;

        if self.qty <= 0 {
            return Err(StateError::InvariantViolation(Invariant::PositiveQuantity));
        }

        let ticker = self.ticker.ok_or(missing("ticker"))?;
        validate_ticker(&ticker)?;

        Ok(PositionState {
            owner,
            issuance,
            face_value,
            maturity_date,
            qty: self.qty,
            ticker,
            version: 0,
            predecessor: None,
        })
    }
}

fn missing(field: &'static str) -> StateError {
    StateError::InvalidField {
        field,
        reason: "field is not set".into(),
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> PositionState {
        let issuer = PartyId::generate("party_").unwrap();
        PositionDraft::new()
            .set_owner(OwnerId::generate("owner_").unwrap())
            .set_issuance(Issuance {
                party: issuer.clone(),
                reference: IssueRef::generate(),
            })
            .set_face_value(FaceValue {
                amount: 100,
                currency: Currency::USD,
                issuer,
            })
            .set_maturity_date(TimeStamp::new_with(2030, 1, 1, 0, 0, 0))
            .set_qty(100)
            .set_ticker("ABC")
            .validate_and_finalise()
            .unwrap()
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decoded: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn state_encoding() {
        let original = sample_state();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decoded: PositionState = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn equal_states_share_a_content_id() {
        let state = sample_state();
        let copy = state.clone();

        let (id_a, _) = state.encode_hashed().unwrap();
        let (id_b, _) = copy.encode_hashed().unwrap();

        assert_eq!(id_a, id_b);
    }

    #[test]
    fn transition_changes_the_content_id() {
        let state = sample_state();
        let moved = state.with_qty(50).unwrap();

        let (id_a, _) = state.encode_hashed().unwrap();
        let (id_b, _) = moved.encode_hashed().unwrap();

        assert_ne!(id_a, id_b);
    }
}
