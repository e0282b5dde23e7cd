pub(crate) mod deal;
pub(crate) mod fees;

use bitcoin::{Amount, FeeRate};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ConditionViolation, Error},
    parties::{Contractor, PartyPair},
};

pub use deal::Deal;

use std::time::{SystemTime, UNIX_EPOCH};

/// A type alias for clarity. Deals are referred to by their index in
/// [`Conditions::deals`], and every per-deal array (oracle commitments,
/// settlement signatures) is aligned with that ordering.
pub type DealIndex = usize;

/// The terms of a contract, which both contractors must agree on before
/// negotiation begins.
///
/// A `Conditions` value can only be obtained through validation, so any
/// `Conditions` in hand is known to be well formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConditionsParams")]
pub struct Conditions {
    /// Unix timestamp (seconds) at which the oracle is expected to attest.
    fixing_time: u64,

    /// The amount of on-chain capital each contractor puts into the funding output.
    fund_amounts: PartyPair<Amount>,

    /// Fee rate for the funding transaction.
    fund_fee_rate: FeeRate,

    /// Fee rate for the settlement, refund and closing transactions.
    settlement_fee_rate: FeeRate,

    /// Absolute locktime (block height or timestamp) after which the refund
    /// transaction becomes valid.
    refund_locktime: u32,

    /// Every possible outcome of the contract.
    deals: Vec<Deal>,
}

/// The unvalidated shape of [`Conditions`], used when deserializing.
#[derive(Deserialize)]
struct ConditionsParams {
    fixing_time: u64,
    fund_amounts: PartyPair<Amount>,
    fund_fee_rate: FeeRate,
    settlement_fee_rate: FeeRate,
    refund_locktime: u32,
    deals: Vec<Deal>,
}

impl TryFrom<ConditionsParams> for Conditions {
    type Error = Error;

    /// Stored conditions are re-validated structurally. Their fixing time is
    /// not required to be in the future, since a persisted contract outlives it.
    fn try_from(params: ConditionsParams) -> Result<Conditions, Error> {
        let conditions = Conditions {
            fixing_time: params.fixing_time,
            fund_amounts: params.fund_amounts,
            fund_fee_rate: params.fund_fee_rate,
            settlement_fee_rate: params.settlement_fee_rate,
            refund_locktime: params.refund_locktime,
            deals: params.deals,
        };
        let violations = conditions.structural_violations();
        if !violations.is_empty() {
            return Err(Error::InvalidConditions(violations));
        }
        Ok(conditions)
    }
}

impl Conditions {
    /// Validates and constructs a new set of contract conditions. Every violated
    /// constraint is reported in the returned [`Error::InvalidConditions`].
    pub fn new(
        fixing_time: u64,
        fund_amounts: PartyPair<Amount>,
        fund_fee_rate: FeeRate,
        settlement_fee_rate: FeeRate,
        refund_locktime: u32,
        deals: Vec<Deal>,
    ) -> Result<Conditions, Error> {
        let conditions = Conditions {
            fixing_time,
            fund_amounts,
            fund_fee_rate,
            settlement_fee_rate,
            refund_locktime,
            deals,
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut violations = Vec::new();
        if conditions.fixing_time <= now {
            violations.push(ConditionViolation::FixingTimeNotFuture {
                fixing_time: conditions.fixing_time,
                now,
            });
        }
        violations.extend(conditions.structural_violations());

        if !violations.is_empty() {
            return Err(Error::InvalidConditions(violations));
        }
        Ok(conditions)
    }

    /// Checks every constraint which does not depend on the current time.
    fn structural_violations(&self) -> Vec<ConditionViolation> {
        let mut violations = Vec::new();

        for party in Contractor::ALL {
            if self.fund_amounts[party] == Amount::ZERO {
                violations.push(ConditionViolation::ZeroFundAmount(party));
            }
        }

        if self.fund_fee_rate == FeeRate::ZERO {
            violations.push(ConditionViolation::ZeroFundFeeRate);
        }
        if self.settlement_fee_rate == FeeRate::ZERO {
            violations.push(ConditionViolation::ZeroSettlementFeeRate);
        }
        if self.refund_locktime == 0 {
            violations.push(ConditionViolation::ZeroRefundLocktime);
        }

        if self.deals.is_empty() {
            violations.push(ConditionViolation::NoDeals);
        }

        let funding = self.fund_total();
        for (index, deal) in self.deals.iter().enumerate() {
            if deal.messages.is_empty() {
                violations.push(ConditionViolation::EmptyDealMessages(index));
            }

            match (deal.total(), funding) {
                (Some(payout), Some(funding)) if payout <= funding => {}
                (payout, funding) => violations.push(ConditionViolation::DealExceedsFunding {
                    index,
                    payout: payout.unwrap_or(Amount::MAX),
                    funding: funding.unwrap_or(Amount::MAX),
                }),
            }

            if deal.total() == Some(Amount::ZERO) {
                violations.push(ConditionViolation::DealPaysNothing(index));
            }

            // Deals are compared by their messages.
            if let Some(duplicate_of) = self.deals[..index].iter().position(|d| d == deal) {
                violations.push(ConditionViolation::DuplicateDeal {
                    index,
                    duplicate_of,
                });
            }
        }

        violations
    }

    /// Checks that the refund and every deal leave at least one payout above
    /// the dust limit once the settlement fee is taken off, so that every
    /// settlement transaction can actually be built. Every failing deal is
    /// reported in the returned [`Error::InvalidConditions`].
    ///
    /// This depends on the fee rate as well as the amounts, so it is separate
    /// from construction: tiny test contracts are still valid to fund.
    pub fn check_payouts(&self) -> Result<(), Error> {
        let pays_above_dust = |amounts: &PartyPair<Amount>| {
            fees::payout_values(self.settlement_fee_rate, amounts)
                .is_ok_and(|values| values.iter().any(|(_, value)| value.is_some()))
        };

        let mut violations = Vec::new();
        if !pays_above_dust(&self.fund_amounts) {
            violations.push(ConditionViolation::RefundPaysOnlyDust);
        }
        for (index, deal) in self.deals.iter().enumerate() {
            if !pays_above_dust(&deal.amounts) {
                violations.push(ConditionViolation::DealPaysOnlyDust(index));
            }
        }

        if !violations.is_empty() {
            return Err(Error::InvalidConditions(violations));
        }
        Ok(())
    }

    pub fn fixing_time(&self) -> u64 {
        self.fixing_time
    }

    pub fn fund_amount(&self, party: Contractor) -> Amount {
        self.fund_amounts[party]
    }

    pub fn fund_amounts(&self) -> &PartyPair<Amount> {
        &self.fund_amounts
    }

    /// The sum of both contractors' fund amounts, or `None` on overflow.
    pub fn fund_total(&self) -> Option<Amount> {
        self.fund_amounts
            .first_party
            .checked_add(self.fund_amounts.second_party)
    }

    pub fn fund_fee_rate(&self) -> FeeRate {
        self.fund_fee_rate
    }

    pub fn settlement_fee_rate(&self) -> FeeRate {
        self.settlement_fee_rate
    }

    pub fn refund_locktime(&self) -> u32 {
        self.refund_locktime
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    /// Finds the deal whose message sequence exactly equals `messages`.
    pub fn deal_by_msgs(&self, messages: &[Vec<u8>]) -> Result<(DealIndex, &Deal), Error> {
        self.deals
            .iter()
            .enumerate()
            .find(|(_, deal)| deal.matches(messages))
            .ok_or(Error::DealNotFound)
    }

    /// Canonical byte encoding, used when computing the contract identifier.
    pub(crate) fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.fixing_time.to_be_bytes());
        for party in Contractor::ALL {
            buf.extend_from_slice(&self.fund_amounts[party].to_sat().to_be_bytes());
        }
        buf.extend_from_slice(&self.fund_fee_rate.to_sat_per_kwu().to_be_bytes());
        buf.extend_from_slice(&self.settlement_fee_rate.to_sat_per_kwu().to_be_bytes());
        buf.extend_from_slice(&self.refund_locktime.to_be_bytes());

        buf.extend_from_slice(&(self.deals.len() as u64).to_be_bytes());
        for deal in &self.deals {
            for party in Contractor::ALL {
                buf.extend_from_slice(&deal.amount(party).to_sat().to_be_bytes());
            }
            buf.extend_from_slice(&(deal.messages.len() as u64).to_be_bytes());
            for msg in &deal.messages {
                buf.extend_from_slice(&(msg.len() as u64).to_be_bytes());
                buf.extend_from_slice(msg);
            }
        }
        buf
    }
}
