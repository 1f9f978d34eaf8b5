//! Version chain management with optimistic head replacement
//!
//! One sled tree holds everything: state blobs are content-addressed under
//! `state/<hash>` and written at most once, and each lineage has a single
//! `head/<lineage>` record that is only ever advanced by compare-and-swap.
//! The swap is the sole point of exclusion; candidate construction and
//! validation are pure and run outside it. A caller that loses the swap gets
//! `StaleVersion` and decides its own retry policy.

use std::sync::Arc;

use log::debug;
use sled::{Db, IVec};

use crate::error::{Invariant, LedgerError, StateError};
use crate::position::{Issuance, PositionDraft, PositionState};

/// Identifies one instrument lineage: the sha256 of the CBOR issuance pair
/// captured at issue time. Later `with_issuance` transitions rewrite the
/// field inside states but never this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineageId(String);

impl LineageId {
    /// The lineage a given issuance pair would open (or has opened).
    pub fn for_issuance(issuance: &Issuance) -> Result<Self, LedgerError> {
        let cbor = minicbor::to_vec(issuance).map_err(codec)?;
        Ok(Self(sha256::digest(&cbor)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
struct HeadRecord {
    #[n(0)]
    version: u64,
    #[n(1)]
    state_id: String,
    #[n(2)]
    terminated: bool,
}

pub struct PositionLedger {
    instance: Arc<Db>,
}

impl PositionLedger {
    pub fn new(instance: Arc<Db>) -> Self {
        Self { instance }
    }

    /// Open a lineage at version 0.
    ///
    /// The head key is claimed with a compare-and-swap from empty, so a
    /// second issuance of the same (party, reference) pair loses the claim
    /// and fails with `DuplicateIssuance`.
    pub fn issue(&self, draft: PositionDraft) -> Result<(LineageId, PositionState), LedgerError> {
        let genesis = draft.validate_and_finalise()?;
        let lineage = LineageId::for_issuance(genesis.issuance())?;

        let (state_id, cbor) = genesis.encode_hashed().map_err(codec)?;
        self.instance.insert(state_key(&state_id), cbor)?;

        let head = HeadRecord {
            version: 0,
            state_id,
            terminated: false,
        };
        let claim = self.instance.compare_and_swap(
            head_key(&lineage),
            None as Option<IVec>,
            Some(encode_head(&head)?),
        )?;
        if claim.is_err() {
            return Err(LedgerError::DuplicateIssuance);
        }

        debug!("issued lineage {} at version 0", lineage.as_str());
        Ok((lineage, genesis))
    }

    /// Apply one transition to the current head.
    ///
    /// `expected_version` must match the head the caller last read. The
    /// transition produces a candidate which the ledger stamps with
    /// `version = expected + 1` and the head's content id as predecessor,
    /// re-validates, stores, and swaps in. Losing either the pre-read check
    /// or the swap itself surfaces `StaleVersion` with the version that won;
    /// the caller re-reads the head and retries if it still wants to.
    pub fn apply_transition<F>(
        &self,
        lineage: &LineageId,
        expected_version: u64,
        transition: F,
    ) -> Result<PositionState, LedgerError>
    where
        F: FnOnce(&PositionState) -> Result<PositionState, StateError>,
    {
        let (head, head_bytes) = self.read_head(lineage)?;
        if head.terminated {
            return Err(LedgerError::LineageTerminated);
        }
        if head.version != expected_version {
            return Err(LedgerError::StaleVersion {
                expected: expected_version,
                actual: head.version,
            });
        }

        let head_state = self.load_state(&head.state_id)?;
        let candidate =
            transition(&head_state)?.as_successor(expected_version + 1, head.state_id.clone());
        validate_candidate(&head_state, &candidate)?;

        let (state_id, cbor) = candidate.encode_hashed().map_err(codec)?;
        self.instance.insert(state_key(&state_id), cbor)?;

        let next = HeadRecord {
            version: candidate.version(),
            state_id,
            terminated: false,
        };
        self.swap_head(lineage, head_bytes, &next, expected_version)?;

        debug!(
            "lineage {} advanced to version {}",
            lineage.as_str(),
            next.version
        );
        Ok(candidate)
    }

    /// The current head state, or `NotFound`. Terminated lineages still
    /// answer; only mutating operations are refused after closure.
    pub fn current_head(&self, lineage: &LineageId) -> Result<PositionState, LedgerError> {
        let (head, _) = self.read_head(lineage)?;
        self.load_state(&head.state_id)
    }

    pub fn is_terminated(&self, lineage: &LineageId) -> Result<bool, LedgerError> {
        Ok(self.read_head(lineage)?.0.terminated)
    }

    /// Close a lineage after full redemption. The chain is retained for
    /// reads; every later `apply_transition` or `terminate` fails with
    /// `LineageTerminated`.
    pub fn terminate(&self, lineage: &LineageId, expected_version: u64) -> Result<(), LedgerError> {
        let (head, head_bytes) = self.read_head(lineage)?;
        if head.terminated {
            return Err(LedgerError::LineageTerminated);
        }
        if head.version != expected_version {
            return Err(LedgerError::StaleVersion {
                expected: expected_version,
                actual: head.version,
            });
        }

        let closed = HeadRecord {
            terminated: true,
            ..head
        };
        self.swap_head(lineage, head_bytes, &closed, expected_version)?;

        debug!(
            "lineage {} terminated at version {}",
            lineage.as_str(),
            expected_version
        );
        Ok(())
    }

    /// Walk the chain from the head back to issuance, newest first.
    pub fn history(&self, lineage: &LineageId) -> Result<Vec<PositionState>, LedgerError> {
        let (head, _) = self.read_head(lineage)?;

        let mut chain = Vec::with_capacity(head.version as usize + 1);
        let mut next = Some(head.state_id);
        while let Some(state_id) = next {
            let state = self.load_state(&state_id)?;
            next = state.predecessor().map(str::to_string);
            chain.push(state);
        }

        Ok(chain)
    }

    /// Re-verify a whole chain against the store: every blob must hash to
    /// the id naming it, versions must count down to 0 with no gaps, links
    /// must close, and every version must satisfy the field invariants
    /// relative to its predecessor. Returns the number of versions checked.
    pub fn audit(&self, lineage: &LineageId) -> Result<u64, LedgerError> {
        let (head, _) = self.read_head(lineage)?;

        let mut checked = 0u64;
        let mut cursor = head.state_id.clone();
        let mut expected_version = head.version;
        loop {
            let bytes = self.instance.get(state_key(&cursor))?.ok_or_else(|| {
                LedgerError::Inconsistent(format!("missing state blob {cursor}"))
            })?;
            if sha256::digest(&bytes[..]) != cursor {
                return Err(LedgerError::Inconsistent(format!(
                    "state blob does not hash to its id {cursor}"
                )));
            }
            let state: PositionState = minicbor::decode(&bytes).map_err(codec)?;
            if state.version() != expected_version {
                return Err(StateError::InvariantViolation(Invariant::VersionSequence).into());
            }
            if state.qty() <= 0 {
                return Err(StateError::InvariantViolation(Invariant::PositiveQuantity).into());
            }
            checked += 1;

            match state.predecessor() {
                Some(prior_id) => {
                    if expected_version == 0 {
                        return Err(
                            StateError::InvariantViolation(Invariant::PredecessorLink).into()
                        );
                    }
                    let prior = self.load_state(prior_id)?;
                    if prior.face_value().currency != state.face_value().currency {
                        return Err(
                            StateError::InvariantViolation(Invariant::CurrencyImmutable).into()
                        );
                    }
                    if state.maturity_date() < prior.maturity_date() {
                        return Err(
                            StateError::InvariantViolation(Invariant::MaturityMonotonic).into()
                        );
                    }
                    cursor = prior_id.to_string();
                    expected_version -= 1;
                }
                None => {
                    if expected_version != 0 {
                        return Err(
                            StateError::InvariantViolation(Invariant::PredecessorLink).into()
                        );
                    }
                    return Ok(checked);
                }
            }
        }
    }

    fn read_head(&self, lineage: &LineageId) -> Result<(HeadRecord, IVec), LedgerError> {
        let bytes = self
            .instance
            .get(head_key(lineage))?
            .ok_or(LedgerError::NotFound)?;
        let record: HeadRecord = minicbor::decode(&bytes).map_err(codec)?;
        Ok((record, bytes))
    }

    fn load_state(&self, state_id: &str) -> Result<PositionState, LedgerError> {
        let bytes = self
            .instance
            .get(state_key(state_id))?
            .ok_or_else(|| LedgerError::Inconsistent(format!("missing state blob {state_id}")))?;
        minicbor::decode(&bytes).map_err(codec)
    }

    fn swap_head(
        &self,
        lineage: &LineageId,
        current: IVec,
        next: &HeadRecord,
        expected_version: u64,
    ) -> Result<(), LedgerError> {
        let swap = self.instance.compare_and_swap(
            head_key(lineage),
            Some(current),
            Some(encode_head(next)?),
        )?;
        match swap {
            Ok(()) => Ok(()),
            Err(lost) => {
                // another writer won the race; report where the head landed
                let actual = lost
                    .current
                    .as_deref()
                    .and_then(|bytes| minicbor::decode::<HeadRecord>(bytes).ok())
                    .map(|rec| rec.version)
                    .unwrap_or(expected_version);
                Err(LedgerError::StaleVersion {
                    expected: expected_version,
                    actual,
                })
            }
        }
    }
}

// The transition constructors uphold these already; candidates reach the
// ledger through an arbitrary closure, so the chain rules are re-checked
// against the head before the swap.
fn validate_candidate(head: &PositionState, candidate: &PositionState) -> Result<(), LedgerError> {
    if candidate.qty() <= 0 {
        return violated(Invariant::PositiveQuantity);
    }
    if candidate.face_value().currency != head.face_value().currency {
        return violated(Invariant::CurrencyImmutable);
    }
    if candidate.maturity_date() < head.maturity_date() {
        return violated(Invariant::MaturityMonotonic);
    }
    Ok(())
}

fn violated(invariant: Invariant) -> Result<(), LedgerError> {
    Err(StateError::InvariantViolation(invariant).into())
}

fn head_key(lineage: &LineageId) -> Vec<u8> {
    format!("head/{}", lineage.0).into_bytes()
}

fn state_key(state_id: &str) -> Vec<u8> {
    format!("state/{state_id}").into_bytes()
}

fn encode_head(head: &HeadRecord) -> Result<IVec, LedgerError> {
    Ok(IVec::from(minicbor::to_vec(head).map_err(codec)?))
}

fn codec<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Codec(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_record_encoding() {
        let original = HeadRecord {
            version: 7,
            state_id: "abc123".to_string(),
            terminated: false,
        };

        let encoding = minicbor::to_vec(&original).unwrap();
        let decoded: HeadRecord = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decoded);
    }
}
