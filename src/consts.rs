/// Version used for every transaction built by this crate.
pub const TX_VERSION: bitcoin::transaction::Version = bitcoin::transaction::Version::TWO;

/// The serialized length of a P2WPKH script pubkey.
pub const P2WPKH_SCRIPT_PUBKEY_SIZE: usize = 22;

/// The serialized length of a P2WSH script pubkey.
pub const P2WSH_SCRIPT_PUBKEY_SIZE: usize = 34;

/// The length of the 2-of-2 multisig funding script:
/// `OP_2 <33 byte key> <33 byte key> OP_2 OP_CHECKMULTISIG`.
pub const FUNDING_SCRIPT_SIZE: usize = 71;

/// Max size of a DER-encoded ECDSA signature plus its sighash byte.
pub const MAX_ECDSA_SIGNATURE_SIZE: usize = 73;

/// This was computed using [`bitcoin`] v0.31.1.
/// Test coverage ensures this stays is up-to-date.
pub const P2WPKH_DUST_VALUE: bitcoin::Amount = bitcoin::Amount::from_sat(294);
