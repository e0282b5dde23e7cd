//! Drivers which run one contractor's whole negotiation over a [`Channel`].
//!
//! The protocol is half-duplex. The offering contractor speaks first in every
//! round, and the accepting contractor answers:
//!
//! 1. `Offer` and `Accept` carry each side's [`PartyOffer`].
//! 2. Each side sends its [`SettlementSignatures`], tagged with the contract
//!    identifier it computed. A mismatch aborts the negotiation.
//! 3. Each side sends the witnesses for its own funding inputs.
//!
//! Both drivers expect a fresh [`Builder`] with the oracle's public parameters
//! already set, and return the fully witnessed funding transaction.

use bitcoin::Transaction;
use log::{info, warn};

use crate::{
    builder::Builder,
    dlc::ContractId,
    errors::Error,
    messages::{Channel, FundWitnesses, Message, PartyOffer, SettlementSignatures},
    wallet::Wallet,
};

fn send<C: Channel>(channel: &mut C, msg: Message) -> Result<(), Error> {
    channel
        .send(msg)
        .map_err(|err| Error::Transport(err.to_string()))
}

fn recv<C: Channel>(channel: &mut C) -> Result<Message, Error> {
    channel
        .recv()
        .map_err(|err| Error::Transport(err.to_string()))
}

fn unexpected(expected: &'static str, actual: &Message) -> Error {
    warn!("expected {} message, received {}", expected, actual.kind());
    Error::UnexpectedMessage {
        expected,
        actual: actual.kind(),
    }
}

fn recv_offer<C: Channel>(channel: &mut C) -> Result<PartyOffer, Error> {
    match recv(channel)? {
        Message::Offer(offer) => Ok(offer),
        other => Err(unexpected("offer", &other)),
    }
}

fn recv_accept<C: Channel>(channel: &mut C) -> Result<PartyOffer, Error> {
    match recv(channel)? {
        Message::Accept(offer) => Ok(offer),
        other => Err(unexpected("accept", &other)),
    }
}

fn recv_settlement_signatures<C: Channel>(
    channel: &mut C,
    contract_id: ContractId,
) -> Result<SettlementSignatures, Error> {
    let sigs = match recv(channel)? {
        Message::SettlementSignatures(sigs) => sigs,
        other => return Err(unexpected("settlement signatures", &other)),
    };
    if sigs.contract_id != contract_id {
        warn!(
            "contract id mismatch: ours {}, theirs {}",
            contract_id, sigs.contract_id
        );
        return Err(Error::ContractIdMismatch {
            ours: contract_id.to_string(),
            theirs: sigs.contract_id.to_string(),
        });
    }
    Ok(sigs)
}

fn recv_fund_witnesses<C: Channel>(channel: &mut C) -> Result<FundWitnesses, Error> {
    match recv(channel)? {
        Message::FundWitnesses(witnesses) => Ok(witnesses),
        other => Err(unexpected("fund witnesses", &other)),
    }
}

fn sign_settlements<W: Wallet>(
    builder: &mut Builder<W>,
    contract_id: ContractId,
) -> Result<SettlementSignatures, Error> {
    Ok(SettlementSignatures {
        contract_id,
        cet_signatures: builder.sign_contract_execution_txs()?,
        refund_signature: builder.sign_refund_tx()?,
    })
}

fn accept_settlements<W: Wallet>(
    builder: &mut Builder<W>,
    sigs: SettlementSignatures,
) -> Result<(), Error> {
    builder.accept_cetx_signatures(sigs.cet_signatures)?;
    builder.accept_refund_tx_signature(sigs.refund_signature)
}

/// Runs the negotiation as the contractor who makes the offer.
///
/// Conditions whose refund or deals would pay only dust are rejected before
/// any key or coin leaves the wallet.
pub fn run_offerer<W: Wallet, C: Channel>(
    builder: &mut Builder<W>,
    channel: &mut C,
) -> Result<Transaction, Error> {
    builder.conditions().check_payouts()?;
    builder.prepare_pubkey()?;
    builder.prepare_fund_tx_ins()?;
    send(channel, Message::Offer(builder.offer()?))?;

    builder.accept_offer(recv_accept(channel)?)?;
    let contract_id = builder.contract_id()?;
    info!("{}: computed contract id {}", builder.role(), contract_id);

    let own_sigs = sign_settlements(builder, contract_id)?;
    send(channel, Message::SettlementSignatures(own_sigs))?;
    let their_sigs = recv_settlement_signatures(channel, contract_id)?;
    accept_settlements(builder, their_sigs)?;
    info!("{}: contract {} agreed", builder.role(), contract_id);

    let witnesses = builder.sign_fund_tx()?;
    send(channel, Message::FundWitnesses(FundWitnesses { witnesses }))?;
    let their_witnesses = recv_fund_witnesses(channel)?;
    builder.accept_fund_witnesses(their_witnesses.witnesses)?;

    builder.finalize()
}

/// Runs the negotiation as the contractor who accepts an offer.
pub fn run_accepter<W: Wallet, C: Channel>(
    builder: &mut Builder<W>,
    channel: &mut C,
) -> Result<Transaction, Error> {
    builder.conditions().check_payouts()?;
    builder.prepare_pubkey()?;
    builder.prepare_fund_tx_ins()?;

    builder.accept_offer(recv_offer(channel)?)?;
    send(channel, Message::Accept(builder.offer()?))?;
    let contract_id = builder.contract_id()?;
    info!("{}: computed contract id {}", builder.role(), contract_id);

    let their_sigs = recv_settlement_signatures(channel, contract_id)?;
    let own_sigs = sign_settlements(builder, contract_id)?;
    accept_settlements(builder, their_sigs)?;
    send(channel, Message::SettlementSignatures(own_sigs))?;
    info!("{}: contract {} agreed", builder.role(), contract_id);

    let their_witnesses = recv_fund_witnesses(channel)?;
    let witnesses = builder.sign_fund_tx()?;
    builder.accept_fund_witnesses(their_witnesses.witnesses)?;
    let fund_tx = builder.finalize()?;
    send(channel, Message::FundWitnesses(FundWitnesses { witnesses }))?;

    Ok(fund_tx)
}
