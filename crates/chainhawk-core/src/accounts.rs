//! Deployer identities.
//!
//! The default pool is the set Anvil derives from its well-known development
//! mnemonic, so a freshly started chain funds them without extra setup.

use serde::{Deserialize, Serialize};

/// Anvil's default development mnemonic.
pub const DEFAULT_MNEMONIC: &str = "test test test test test test test test test test test junk";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub private_key: String,
}

impl Account {
    pub fn new(address: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            private_key: private_key.into(),
        }
    }
}

/// First accounts derived from [`DEFAULT_MNEMONIC`].
pub fn default_accounts() -> Vec<Account> {
    vec![
        Account::new(
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ),
        Account::new(
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
            "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        ),
        Account::new(
            "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
            "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
        ),
    ]
}
