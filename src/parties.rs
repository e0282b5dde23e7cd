use serde::{Deserialize, Serialize};

use crate::errors::{Error, Field};

use std::{fmt, ops::Index};

/// One of the two symmetric peers of a contract. The [`FirstParty`][Contractor::FirstParty]
/// creates the offer, and the [`SecondParty`][Contractor::SecondParty] accepts it.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Contractor {
    FirstParty,
    SecondParty,
}

impl Contractor {
    /// Both contractors in canonical order.
    pub const ALL: [Contractor; 2] = [Contractor::FirstParty, Contractor::SecondParty];

    /// Returns the other party of the contract.
    pub fn counterparty(self) -> Contractor {
        match self {
            Contractor::FirstParty => Contractor::SecondParty,
            Contractor::SecondParty => Contractor::FirstParty,
        }
    }
}

impl fmt::Display for Contractor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Contractor::FirstParty => f.write_str("first party"),
            Contractor::SecondParty => f.write_str("second party"),
        }
    }
}

/// A value held for each of the two contractors. Since the set of contractors
/// is fixed, this replaces a map keyed by [`Contractor`].
///
/// A `PartyPair<Option<T>>` is used for state which is filled in during
/// negotiation. Such slots are write-once: see [`PartyPair::set_once`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyPair<T> {
    pub first_party: T,
    pub second_party: T,
}

impl<T> PartyPair<T> {
    pub fn new(first_party: T, second_party: T) -> PartyPair<T> {
        PartyPair {
            first_party,
            second_party,
        }
    }

    pub fn get(&self, party: Contractor) -> &T {
        match party {
            Contractor::FirstParty => &self.first_party,
            Contractor::SecondParty => &self.second_party,
        }
    }

    pub fn get_mut(&mut self, party: Contractor) -> &mut T {
        match party {
            Contractor::FirstParty => &mut self.first_party,
            Contractor::SecondParty => &mut self.second_party,
        }
    }

    /// Iterate over both values in canonical contractor order.
    pub fn iter(&self) -> impl Iterator<Item = (Contractor, &T)> {
        Contractor::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    pub fn map<V, F: FnMut(T) -> V>(self, mut map_fn: F) -> PartyPair<V> {
        PartyPair {
            first_party: map_fn(self.first_party),
            second_party: map_fn(self.second_party),
        }
    }
}

impl<T> Index<Contractor> for PartyPair<T> {
    type Output = T;

    fn index(&self, party: Contractor) -> &T {
        self.get(party)
    }
}

impl<T> PartyPair<Option<T>> {
    /// Returns the value stored for `party`, or a [`Error::MissingField`]
    /// if the slot has not been filled yet.
    pub fn require(&self, party: Contractor, field: Field) -> Result<&T, Error> {
        self.get(party)
            .as_ref()
            .ok_or(Error::MissingField { party, field })
    }

    /// Fills the slot for `party`. Fails with [`Error::AlreadySet`] if the slot
    /// already holds a value; a slot is never silently overwritten.
    pub fn set_once(&mut self, party: Contractor, value: T, field: Field) -> Result<(), Error> {
        let slot = self.get_mut(party);
        if slot.is_some() {
            return Err(Error::AlreadySet { party, field });
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn is_set(&self, party: Contractor) -> bool {
        self.get(party).is_some()
    }
}
