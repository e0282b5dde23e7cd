use bitcoin::{transaction::InputWeightPrediction, Amount, FeeRate, Weight};

use crate::{
    consts::{P2WPKH_DUST_VALUE, P2WPKH_SCRIPT_PUBKEY_SIZE, P2WSH_SCRIPT_PUBKEY_SIZE},
    errors::Error,
    parties::PartyPair,
    spend_info::FundingSpendInfo,
};

/// Compute the fee for a transaction given a fixed [`FeeRate`], input weights,
/// and output script lengths.
pub(crate) fn fee_calc_safe<I, O>(
    fee_rate: FeeRate,
    input_weights: I,
    output_spk_lens: O,
) -> Result<Amount, Error>
where
    I: IntoIterator<Item = InputWeightPrediction>,
    O: IntoIterator<Item = usize>,
{
    let tx_weight = bitcoin::transaction::predict_weight(input_weights, output_spk_lens);
    fee_rate
        .fee_wu(tx_weight)
        .ok_or(Error::Fee("fee rate overflow"))
}

/// The weight of a single transaction output with a script pubkey of the given length.
pub(crate) fn output_weight(spk_len: usize) -> Weight {
    // value (8) + script length varint (1) + script
    Weight::from_wu(4 * (8 + 1 + spk_len as u64))
}

/// The share of the funding transaction fee paid by one contractor, excluding
/// the fees for the contractor's own inputs, which the wallet accounts for
/// when selecting coins.
///
/// The transaction overhead and the shared funding output are split evenly
/// between both contractors. Each contractor pays in full for its change output.
pub(crate) fn fund_tx_party_fee(fee_rate: FeeRate) -> Result<Amount, Error> {
    let shared_weight =
        bitcoin::transaction::predict_weight([], [P2WSH_SCRIPT_PUBKEY_SIZE]).to_wu();
    let party_weight = Weight::from_wu((shared_weight + 1) / 2)
        + output_weight(P2WPKH_SCRIPT_PUBKEY_SIZE);
    fee_rate
        .fee_wu(party_weight)
        .ok_or(Error::Fee("fee rate overflow"))
}

/// Safely compute the given output amount by subtracting the fee
/// amount from the amount of available coins. Returns `None` if
/// the result is negative, or is not above the given dust threshold.
pub(crate) fn fee_subtract_safe(
    available_coins: Amount,
    fee: Amount,
    dust_threshold: Amount,
) -> Option<Amount> {
    let after_fee = available_coins.checked_sub(fee)?;
    if after_fee <= dust_threshold {
        return None;
    }
    Some(after_fee)
}

/// The output value each contractor receives from a transaction spending the
/// funding output and paying out `amounts`.
///
/// The fee is split evenly between the contractors with a non-zero amount. A
/// contractor whose amount is left at or below the P2WPKH dust limit after its
/// fee share gets `None`, and no output.
pub(crate) fn payout_values(
    fee_rate: FeeRate,
    amounts: &PartyPair<Amount>,
) -> Result<PartyPair<Option<Amount>>, Error> {
    let payees = amounts
        .iter()
        .filter(|(_, &amount)| amount > Amount::ZERO)
        .count();
    if payees == 0 {
        return Err(Error::Fee("transaction pays nothing to either party"));
    }

    let fee = fee_calc_safe(
        fee_rate,
        [FundingSpendInfo::input_weight()],
        (0..payees).map(|_| P2WPKH_SCRIPT_PUBKEY_SIZE),
    )?;
    let fee_share = Amount::from_sat(fee.to_sat().div_ceil(payees as u64));

    Ok(amounts.map(|amount| fee_subtract_safe(amount, fee_share, P2WPKH_DUST_VALUE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::P2WPKH_DUST_VALUE;

    #[test]
    fn party_fee_covers_half_of_shared_weight() {
        let fee_rate = FeeRate::from_sat_per_vb_unchecked(10);
        let fee = fund_tx_party_fee(fee_rate).unwrap();

        let shared = fee_calc_safe(fee_rate, [], [P2WSH_SCRIPT_PUBKEY_SIZE]).unwrap();
        let change = fee_rate
            .fee_wu(output_weight(P2WPKH_SCRIPT_PUBKEY_SIZE))
            .unwrap();
        assert!(fee >= shared / 2 + change);
        assert!(fee <= shared / 2 + change + Amount::from_sat(10));
    }

    #[test]
    fn subtract_rejects_dust() {
        assert_eq!(
            fee_subtract_safe(Amount::from_sat(1000), Amount::from_sat(100), P2WPKH_DUST_VALUE),
            Some(Amount::from_sat(900))
        );
        assert_eq!(
            fee_subtract_safe(Amount::from_sat(300), Amount::from_sat(6), P2WPKH_DUST_VALUE),
            None
        );
        assert_eq!(
            fee_subtract_safe(Amount::from_sat(100), Amount::from_sat(200), P2WPKH_DUST_VALUE),
            None
        );
    }

    #[test]
    fn payout_values_split_fee_and_drop_dust() {
        let fee_rate = FeeRate::from_sat_per_vb_unchecked(5);

        let values = payout_values(
            fee_rate,
            &PartyPair::new(Amount::from_sat(100_000), Amount::from_sat(100_000)),
        )
        .unwrap();
        let first = values.first_party.unwrap();
        assert_eq!(values.second_party, Some(first));
        assert!(first < Amount::from_sat(100_000));

        // A single payee carries the whole fee.
        let values =
            payout_values(fee_rate, &PartyPair::new(Amount::ZERO, Amount::from_sat(200_000)))
                .unwrap();
        assert_eq!(values.first_party, None);
        assert!(values.second_party.unwrap() < first + first);

        let values =
            payout_values(fee_rate, &PartyPair::new(Amount::from_sat(1), Amount::from_sat(1)))
                .unwrap();
        assert_eq!(values, PartyPair::new(None, None));

        assert!(payout_values(fee_rate, &PartyPair::new(Amount::ZERO, Amount::ZERO)).is_err());
    }
}
