use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::parties::{Contractor, PartyPair};

/// One possible outcome of the contract: how the funds are split between the
/// two contractors, and the sequence of messages the oracle signs to attest
/// to this outcome (e.g. the digits of a numeric observation).
///
/// Two deals are equal if and only if their message sequences are equal.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Deal {
    /// The settlement amount paid to each contractor if this deal is fixed.
    pub amounts: PartyPair<Amount>,

    /// The oracle's encoding of this outcome, one message per nonce point.
    #[serde(with = "crate::serialization::vec_of_byte_vecs")]
    pub messages: Vec<Vec<u8>>,
}

impl Deal {
    pub fn new(first_party: Amount, second_party: Amount, messages: Vec<Vec<u8>>) -> Deal {
        Deal {
            amounts: PartyPair::new(first_party, second_party),
            messages,
        }
    }

    pub fn amount(&self, party: Contractor) -> Amount {
        self.amounts[party]
    }

    /// Sum of both settlement amounts, or `None` on overflow.
    pub fn total(&self) -> Option<Amount> {
        self.amounts
            .first_party
            .checked_add(self.amounts.second_party)
    }

    /// Returns true if this deal's messages exactly equal `messages`.
    pub fn matches(&self, messages: &[Vec<u8>]) -> bool {
        self.messages.as_slice() == messages
    }
}

impl PartialEq for Deal {
    fn eq(&self, other: &Self) -> bool {
        self.messages == other.messages
    }
}
