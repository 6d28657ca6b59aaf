//! Wire format of the encryption relayer.

use {
    alloy::primitives::{Address, Bytes},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputProofRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub contract_chain_id: u64,
    /// Bit width of every value, in order.
    pub bits: Vec<u8>,
    /// Plaintext values as decimal strings.
    pub values: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputProofResponse {
    /// Hex encoded ciphertext handles, one per value.
    pub handles: Vec<String>,
    /// Hex encoded proof covering all handles.
    pub input_proof: String,
}

impl InputProofResponse {
    pub fn decode(self) -> Result<super::EncryptedInput, const_hex::FromHexError> {
        Ok(super::EncryptedInput {
            handles: self
                .handles
                .iter()
                .map(|handle| const_hex::decode(handle).map(Bytes::from))
                .collect::<Result<_, _>>()?,
            input_proof: const_hex::decode(&self.input_proof)?.into(),
        })
    }
}
