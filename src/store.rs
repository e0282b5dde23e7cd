use log::debug;

use crate::{
    dlc::{ContractId, Dlc},
    errors::Error,
};

use std::collections::BTreeMap;

/// Persistence for negotiated contracts, keyed by contract identifier.
pub trait ContractStore {
    /// Store a contract under its identifier, replacing any earlier version.
    fn store_contract(&mut self, dlc: &Dlc) -> Result<ContractId, Error>;

    fn load_contract(&self, contract_id: &ContractId) -> Result<Dlc, Error>;

    fn contract_ids(&self) -> Vec<ContractId>;
}

/// A [`ContractStore`] which keeps serialized contracts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryContractStore {
    contracts: BTreeMap<ContractId, Vec<u8>>,
}

impl MemoryContractStore {
    pub fn new() -> MemoryContractStore {
        MemoryContractStore::default()
    }
}

impl ContractStore for MemoryContractStore {
    fn store_contract(&mut self, dlc: &Dlc) -> Result<ContractId, Error> {
        let contract_id = dlc.contract_id()?;
        let bytes = serde_json::to_vec(dlc).map_err(|err| Error::Serialization(err.to_string()))?;
        debug!("storing contract {} ({} bytes)", contract_id, bytes.len());
        self.contracts.insert(contract_id, bytes);
        Ok(contract_id)
    }

    fn load_contract(&self, contract_id: &ContractId) -> Result<Dlc, Error> {
        let bytes = self
            .contracts
            .get(contract_id)
            .ok_or_else(|| Error::ContractNotFound(contract_id.to_string()))?;
        serde_json::from_slice(bytes).map_err(|err| Error::Serialization(err.to_string()))
    }

    fn contract_ids(&self) -> Vec<ContractId> {
        self.contracts.keys().copied().collect()
    }
}
