//! End-to-end walkthrough: issue a position, transfer it, consult a quote,
//! bump the face value, then redeem the lineage.

use std::sync::Arc;
use std::time::Duration;

use position_ledger::identity::{IssueRef, OwnerId, PartyId};
use position_ledger::ledger::PositionLedger;
use position_ledger::position::{Currency, FaceValue, Issuance, PositionDraft, TimeStamp};
use position_ledger::quote::{FixedQuoteClient, PriceQuoteClient, PriceResult, YahooQuoteClient};

fn main() -> anyhow::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("quickstart.db"))?);
    let ledger = PositionLedger::new(db);

    let issuer = PartyId::generate("party_")?;
    let alice = OwnerId::generate("owner_")?;
    let bob = OwnerId::generate("owner_")?;

    let draft = PositionDraft::new()
        .set_owner(alice)
        .set_issuance(Issuance {
            party: issuer.clone(),
            reference: IssueRef::generate(),
        })
        .set_face_value(FaceValue {
            amount: 100,
            currency: Currency::USD,
            issuer,
        })
        .set_maturity_date(TimeStamp::new_with(2030, 6, 30, 0, 0, 0))
        .set_qty(100)
        .set_ticker("ABC");

    let (lineage, genesis) = ledger.issue(draft)?;
    println!("issued {} at version {}", lineage.as_str(), genesis.version());

    // transfer to bob against the head we just read
    let head = ledger.apply_transition(&lineage, genesis.version(), |state| {
        state.with_owner(bob.clone())
    })?;
    println!("owner is now {}", head.owner().as_str());

    // a quote is advisory input, fetched outside any ledger operation.
    // swap in YahooQuoteClient for a live (best-effort) lookup:
    let _live = YahooQuoteClient::new(Duration::from_secs(5));
    let quotes = FixedQuoteClient::new().set_price("ABC", 104.25);
    let head = match quotes.fetch_price(head.ticker()) {
        PriceResult::Price(price) => {
            let face_value = FaceValue {
                amount: price.round() as u64,
                ..head.face_value().clone()
            };
            ledger.apply_transition(&lineage, head.version(), move |state| {
                state.with_face_value(face_value)
            })?
        }
        PriceResult::Unavailable => {
            println!("no quote for {}; face value left alone", head.ticker());
            head
        }
    };
    println!(
        "face value {} {:?} at version {}",
        head.face_value().amount,
        head.face_value().currency,
        head.version()
    );

    // full redemption closes the lineage
    ledger.terminate(&lineage, head.version())?;
    println!("terminated: {}", ledger.is_terminated(&lineage)?);

    for state in ledger.history(&lineage)? {
        println!(
            "  v{} owner={} qty={}",
            state.version(),
            state.owner().as_str(),
            state.qty()
        );
    }

    Ok(())
}
