//! Property-based tests for position transitions
//!
//! These use proptest to check that every transition applies exactly one
//! field change and that the rejection rules hold across the whole input
//! space, not just hand-picked cases. The transitions are the only way a
//! new version can come into being, so a bug here corrupts every chain
//! built on top of them.

use proptest::prelude::*;

use position_ledger::error::{Invariant, StateError};
use position_ledger::identity::{IssueRef, OwnerId, PartyId};
use position_ledger::position::{
    Currency, FaceValue, Issuance, PositionDraft, PositionState, TimeStamp,
};

// PROPERTY TEST STRATEGIES

/// Strategy to generate random Currency values
fn currency_strategy() -> impl Strategy<Value = Currency> {
    (0u8..=2).prop_map(|i| match i {
        0 => Currency::USD,
        1 => Currency::GBP,
        _ => Currency::EUR,
    })
}

/// Strategy to generate positive quantities
fn qty_strategy() -> impl Strategy<Value = i64> {
    1i64..=1_000_000_000
}

/// Strategy to generate positive face value amounts
fn amount_strategy() -> impl Strategy<Value = u64> {
    1u64..=100_000_000
}

/// Strategy to generate a finalised version 0 state
fn state_strategy() -> impl Strategy<Value = PositionState> {
    (
        currency_strategy(),
        qty_strategy(),
        amount_strategy(),
        "[A-Z]{1,12}",
        2025i32..=2035,
    )
        .prop_map(|(currency, qty, amount, ticker, year)| {
            let issuer = PartyId::generate("party_").unwrap();
            PositionDraft::new()
                .set_owner(OwnerId::generate("owner_").unwrap())
                .set_issuance(Issuance {
                    party: issuer.clone(),
                    reference: IssueRef::generate(),
                })
                .set_face_value(FaceValue {
                    amount,
                    currency,
                    issuer,
                })
                .set_maturity_date(TimeStamp::new_with(year, 6, 15, 0, 0, 0))
                .set_qty(qty)
                .set_ticker(&ticker)
                .validate_and_finalise()
                .unwrap()
        })
}

// PROPERTY TESTS
proptest! {
    /// Property: finalising a complete valid draft always yields version 0
    /// with no predecessor.
    #[test]
    fn prop_finalised_draft_is_the_issuance_version(state in state_strategy()) {
        prop_assert_eq!(state.version(), 0);
        prop_assert_eq!(state.predecessor(), None);
    }

    /// Property: with_qty for a positive quantity changes the quantity and
    /// nothing else.
    #[test]
    fn prop_with_qty_changes_only_the_quantity(
        state in state_strategy(),
        new_qty in qty_strategy()
    ) {
        let next = state.with_qty(new_qty).unwrap();

        prop_assert_eq!(next.qty(), new_qty);
        prop_assert_eq!(next.owner(), state.owner());
        prop_assert_eq!(next.issuance(), state.issuance());
        prop_assert_eq!(next.face_value(), state.face_value());
        prop_assert_eq!(next.maturity_date(), state.maturity_date());
        prop_assert_eq!(next.ticker(), state.ticker());
        prop_assert_eq!(next.version(), state.version());
        prop_assert_eq!(next.predecessor(), state.predecessor());
    }

    /// Property: zero and negative quantities are always rejected.
    #[test]
    fn prop_nonpositive_qty_is_rejected(
        state in state_strategy(),
        bad_qty in -1_000_000i64..=0
    ) {
        prop_assert_eq!(
            state.with_qty(bad_qty),
            Err(StateError::InvariantViolation(Invariant::PositiveQuantity))
        );
    }

    /// Property: a face value in the lineage currency is accepted and
    /// replaces only the face value; any other currency is refused.
    #[test]
    fn prop_face_value_currency_must_match(
        state in state_strategy(),
        new_currency in currency_strategy(),
        new_amount in amount_strategy()
    ) {
        let replacement = FaceValue {
            amount: new_amount,
            currency: new_currency,
            issuer: state.face_value().issuer.clone(),
        };
        let outcome = state.with_face_value(replacement.clone());

        if new_currency == state.face_value().currency {
            let next = outcome.unwrap();
            prop_assert_eq!(next.face_value(), &replacement);
            prop_assert_eq!(next.owner(), state.owner());
            prop_assert_eq!(next.qty(), state.qty());
        } else {
            prop_assert_eq!(
                outcome,
                Err(StateError::InvariantViolation(Invariant::CurrencyImmutable))
            );
        }
    }

    /// Property: the maturity date may move forward or stay, never back.
    #[test]
    fn prop_maturity_date_never_regresses(
        state in state_strategy(),
        year in 2020i32..=2040
    ) {
        let proposed = TimeStamp::new_with(year, 6, 15, 0, 0, 0);
        let outcome = state.with_maturity_date(proposed.clone());

        if &proposed >= state.maturity_date() {
            let next = outcome.unwrap();
            prop_assert_eq!(next.maturity_date(), &proposed);
        } else {
            prop_assert_eq!(
                outcome,
                Err(StateError::InvariantViolation(Invariant::MaturityMonotonic))
            );
        }
    }

    /// Property: tickers within the length bound are accepted verbatim.
    #[test]
    fn prop_valid_ticker_is_accepted(
        state in state_strategy(),
        ticker in "[A-Z0-9]{1,12}"
    ) {
        let next = state.with_ticker(&ticker).unwrap();
        prop_assert_eq!(next.ticker(), ticker.as_str());
    }

    /// Property: overlong tickers are always rejected as invalid input.
    #[test]
    fn prop_overlong_ticker_is_rejected(
        state in state_strategy(),
        ticker in "[A-Z]{13,40}"
    ) {
        prop_assert!(matches!(
            state.with_ticker(&ticker),
            Err(StateError::InvalidField { field: "ticker", .. })
        ), "overlong ticker should be rejected as invalid input");
    }

    /// Property: a transfer replaces the holder and nothing else, and the
    /// new holder round-trips through its string form.
    #[test]
    fn prop_with_owner_changes_only_the_owner(state in state_strategy()) {
        let next_owner = OwnerId::generate("owner_").unwrap();
        let parsed = OwnerId::parse(next_owner.as_str()).unwrap();

        let next = state.with_owner(parsed).unwrap();

        prop_assert_eq!(next.owner(), &next_owner);
        prop_assert_eq!(next.qty(), state.qty());
        prop_assert_eq!(next.face_value(), state.face_value());
        prop_assert_eq!(next.ticker(), state.ticker());
    }

    /// Property: structural equality decides the content id. A clone hashes
    /// identically; any accepted transition hashes differently.
    #[test]
    fn prop_content_id_follows_structure(
        state in state_strategy(),
        new_qty in qty_strategy()
    ) {
        let (id, _) = state.encode_hashed().unwrap();
        let (clone_id, _) = state.clone().encode_hashed().unwrap();
        prop_assert_eq!(&id, &clone_id);

        let next = state.with_qty(new_qty).unwrap();
        let (next_id, _) = next.encode_hashed().unwrap();
        if new_qty != state.qty() {
            prop_assert_ne!(&id, &next_id);
        } else {
            prop_assert_eq!(&id, &next_id);
        }
    }

    /// Property: a draft missing any field never finalises.
    #[test]
    fn prop_incomplete_draft_is_rejected(qty in qty_strategy()) {
        let outcome = PositionDraft::new().set_qty(qty).validate_and_finalise();
        prop_assert!(matches!(
            outcome,
            Err(StateError::InvalidField { .. })
        ), "incomplete draft should never finalise");
    }

    /// Property: a draft with a non-positive quantity never finalises even
    /// when every other field is present.
    #[test]
    fn prop_draft_rejects_nonpositive_qty(bad_qty in -1_000i64..=0) {
        let issuer = PartyId::generate("party_").unwrap();
        let outcome = PositionDraft::new()
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
            .set_qty(bad_qty)
            .set_ticker("ABC")
            .validate_and_finalise();

        prop_assert_eq!(
            outcome,
            Err(StateError::InvariantViolation(Invariant::PositiveQuantity))
        );
    }
}
