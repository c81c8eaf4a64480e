/// Local account — decrypted signing key, derived address, and network preference.
use std::path::{Path, PathBuf};

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::keystore_file;

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const MAINNET_CHAIN_ID: u64 = 1;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Sepolia,
    Mainnet,
    Custom,
}

impl Network {
    /// Chain id the contract is expected on. `None` for custom endpoints,
    /// where whatever the endpoint reports is accepted.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Network::Sepolia => Some(SEPOLIA_CHAIN_ID),
            Network::Mainnet => Some(MAINNET_CHAIN_ID),
            Network::Custom => None,
        }
    }

    pub fn default_rpc_url(&self) -> Option<&'static str> {
        match self {
            Network::Sepolia => Some("https://ethereum-sepolia-rpc.publicnode.com"),
            Network::Mainnet => Some("https://ethereum-rpc.publicnode.com"),
            Network::Custom => None,
        }
    }

    /// Block explorer base URL, used for "check it yourself" links.
    pub fn explorer_url(&self) -> Option<&'static str> {
        match self {
            Network::Sepolia => Some("https://sepolia.etherscan.io"),
            Network::Mainnet => Some("https://etherscan.io"),
            Network::Custom => None,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Sepolia => write!(f, "sepolia"),
            Network::Mainnet => write!(f, "mainnet"),
            Network::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sepolia" => Ok(Network::Sepolia),
            "mainnet" | "ethereum" => Ok(Network::Mainnet),
            other => Err(format!(
                "Unknown network '{other}'. Use 'sepolia', 'mainnet', or an RPC URL."
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct NetworkConfig {
    pub network: Network,
    pub custom_url: Option<String>,
}

impl NetworkConfig {
    pub fn custom(url: impl Into<String>) -> Self {
        Self {
            network: Network::Custom,
            custom_url: Some(url.into()),
        }
    }

    /// Parse a `network` argument: a known network name or an RPC URL.
    pub fn from_target(target: &str) -> std::result::Result<Self, String> {
        if target.contains("://") {
            return Ok(Self::custom(target));
        }
        Ok(Self {
            network: target.parse()?,
            custom_url: None,
        })
    }
}

/// Serialized account state — what gets encrypted and stored on disk.
#[derive(Serialize, Deserialize)]
struct AccountData {
    private_key: String,
    #[serde(rename = "network")]
    network_config: NetworkConfig,
}

impl Drop for AccountData {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

fn signer_from_hex(key: &str) -> Result<PrivateKeySigner> {
    key.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|e| anyhow::anyhow!("Invalid private key: {e}"))
}

fn generate_signer() -> Result<PrivateKeySigner> {
    let mut bytes: [u8; 32] = rand::random();
    let signer = PrivateKeySigner::from_bytes(&B256::from(bytes))
        .map_err(|e| anyhow::anyhow!("Failed to generate key: {e}"));
    bytes.zeroize();
    signer
}

fn persist(path: &Path, data: &AccountData, password: &[u8]) -> Result<()> {
    let json = Zeroizing::new(serde_json::to_vec(data).context("Failed to serialize account")?);
    keystore_file::write_sealed(path, &json, password).context("Failed to save keystore")?;
    Ok(())
}

/// Unlocked account held for the lifetime of a session.
pub struct Account {
    data: AccountData,
    signer: PrivateKeySigner,
    path: PathBuf,
}

impl Account {
    /// Create a keystore with a freshly generated key.
    pub fn create_new(path: PathBuf, password: &[u8], network_config: NetworkConfig) -> Result<Self> {
        let signer = generate_signer()?;
        Self::store(path, password, signer, network_config)
    }

    /// Create a keystore from an existing hex private key.
    pub fn import(
        path: PathBuf,
        password: &[u8],
        private_key: &str,
        network_config: NetworkConfig,
    ) -> Result<Self> {
        let signer = signer_from_hex(private_key)?;
        Self::store(path, password, signer, network_config)
    }

    fn store(
        path: PathBuf,
        password: &[u8],
        signer: PrivateKeySigner,
        network_config: NetworkConfig,
    ) -> Result<Self> {
        let data = AccountData {
            private_key: alloy::hex::encode_prefixed(signer.to_bytes()),
            network_config,
        };
        persist(&path, &data, password)?;
        Ok(Self { data, signer, path })
    }

    /// Unlock an existing keystore.
    pub fn open(path: &Path, password: &[u8]) -> Result<Self> {
        let json = keystore_file::read_sealed(path, password)
            .context("Failed to open keystore. Wrong password or corrupt file?")?;
        let data: AccountData =
            serde_json::from_slice(&json).context("Failed to parse keystore. File may be corrupt.")?;
        let signer = signer_from_hex(&data.private_key)?;
        Ok(Self {
            data,
            signer,
            path: path.to_path_buf(),
        })
    }

    /// Re-encrypt the keystore under a new password after verifying the old one.
    pub fn change_password(path: &Path, old_password: &[u8], new_password: &[u8]) -> Result<()> {
        let plaintext = keystore_file::read_sealed(path, old_password).map_err(|e| match e {
            keystore_file::KeystoreFileError::DecryptionFailed => {
                anyhow::anyhow!("Current password is incorrect")
            }
            other => anyhow::anyhow!("{other}"),
        })?;
        keystore_file::write_sealed(path, &plaintext, new_password)
            .context("Failed to save keystore with new password")?;
        Ok(())
    }

    /// Re-encrypt and save (e.g. after changing the network preference).
    pub fn save(&self, password: &[u8]) -> Result<()> {
        persist(&self.path, &self.data, password)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn short_address(&self) -> String {
        crate::display::short_address(&self.address())
    }

    pub fn signer(&self) -> PrivateKeySigner {
        self.signer.clone()
    }

    pub fn network_config(&self) -> &NetworkConfig {
        &self.data.network_config
    }

    pub fn set_network_config(&mut self, config: NetworkConfig) {
        self.data.network_config = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (anvil/hardhat account #0).
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcaf784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn import_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.keystore");

        let account = Account::import(path.clone(), b"pw", DEV_KEY, NetworkConfig::default()).unwrap();
        let expected: Address = DEV_ADDRESS.parse().unwrap();
        assert_eq!(account.address(), expected);

        let reopened = Account::open(&path, b"pw").unwrap();
        assert_eq!(reopened.address(), expected);
        assert_eq!(reopened.network_config().network, Network::Sepolia);
    }

    #[test]
    fn create_new_generates_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a = Account::create_new(dir.path().join("a.keystore"), b"pw", NetworkConfig::default())
            .unwrap();
        let b = Account::create_new(dir.path().join("b.keystore"), b"pw", NetworkConfig::default())
            .unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.keystore");
        Account::import(path.clone(), b"pw", DEV_KEY, NetworkConfig::default()).unwrap();
        assert!(Account::open(&path, b"nope").is_err());
    }

    #[test]
    fn invalid_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Account::import(dir.path().join("x.keystore"), b"pw", "0x1234", NetworkConfig::default())
            .err()
            .expect("short key should fail");
        assert!(err.to_string().contains("Invalid private key"));
    }

    #[test]
    fn change_password_and_network_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.keystore");
        let mut account = Account::import(path.clone(), b"old", DEV_KEY, NetworkConfig::default()).unwrap();

        account.set_network_config(NetworkConfig::custom("http://127.0.0.1:8545"));
        account.save(b"old").unwrap();

        assert!(Account::change_password(&path, b"wrong", b"new").is_err());
        Account::change_password(&path, b"old", b"new").unwrap();

        let reopened = Account::open(&path, b"new").unwrap();
        assert_eq!(reopened.network_config().network, Network::Custom);
        assert_eq!(
            reopened.network_config().custom_url.as_deref(),
            Some("http://127.0.0.1:8545")
        );
    }

    #[test]
    fn network_targets() {
        assert_eq!(NetworkConfig::from_target("sepolia").unwrap().network, Network::Sepolia);
        assert_eq!(NetworkConfig::from_target("Mainnet").unwrap().network, Network::Mainnet);
        assert_eq!(
            NetworkConfig::from_target("https://rpc.example/x").unwrap(),
            NetworkConfig::custom("https://rpc.example/x")
        );
        assert!(NetworkConfig::from_target("goerli").is_err());
        assert_eq!(Network::Sepolia.chain_id(), Some(11_155_111));
        assert_eq!(Network::Custom.chain_id(), None);
    }
}
