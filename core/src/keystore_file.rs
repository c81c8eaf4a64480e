/// Encrypted keystore persistence.
///
/// File format: magic `MEMK` (4 bytes) || version (1 byte) || salt (32 bytes)
/// || nonce (12 bytes) || ciphertext
/// Key derivation: Argon2id from password + salt
/// Encryption: AES-256-GCM, with magic + version bound as associated data
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use zeroize::Zeroizing;

const MAGIC: &[u8; 4] = b"MEMK";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

// Argon2id parameters for interactive unlock
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 1;

#[derive(Debug, Error)]
pub enum KeystoreFileError {
    #[error("keystore file is too short to contain valid encrypted data")]
    FileTooShort,
    #[error("not a keystore file (bad magic bytes)")]
    BadMagic,
    #[error("unsupported keystore format version {0}")]
    UnsupportedVersion(u8),
    #[error("decryption failed: wrong password or corrupt file")]
    DecryptionFailed,
    #[error("key derivation failed: argon2 internal error")]
    KeyDerivationFailed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn header() -> [u8; HEADER_LEN] {
    let mut h = [0u8; HEADER_LEN];
    h[..MAGIC.len()].copy_from_slice(MAGIC);
    h[MAGIC.len()] = FORMAT_VERSION;
    h
}

fn cipher_for(password: &[u8], salt: &[u8]) -> Result<Aes256Gcm, KeystoreFileError> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
        .map_err(|_| KeystoreFileError::KeyDerivationFailed)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|_| KeystoreFileError::KeyDerivationFailed)?;
    Aes256Gcm::new_from_slice(&key[..]).map_err(|_| KeystoreFileError::KeyDerivationFailed)
}

/// Seal plaintext under a password. Returns the full file contents.
pub fn seal(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, KeystoreFileError> {
    let salt: [u8; SALT_LEN] = rand::random();
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    let header = header();

    let cipher = cipher_for(password, &salt)?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|_| KeystoreFileError::DecryptionFailed)?;

    let mut output = Vec::with_capacity(HEADER_LEN + SALT_LEN + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&header);
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Open data produced by `seal`. The plaintext is zeroized on drop.
pub fn open(data: &[u8], password: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreFileError> {
    if data.len() < HEADER_LEN + SALT_LEN + NONCE_LEN + 1 {
        return Err(KeystoreFileError::FileTooShort);
    }
    let (header, rest) = data.split_at(HEADER_LEN);
    if &header[..MAGIC.len()] != MAGIC {
        return Err(KeystoreFileError::BadMagic);
    }
    if header[MAGIC.len()] != FORMAT_VERSION {
        return Err(KeystoreFileError::UnsupportedVersion(header[MAGIC.len()]));
    }
    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = cipher_for(password, salt)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| KeystoreFileError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

/// Seal and write to `path` atomically (temp file, fsync, rename).
/// On Unix the directory is set to 0700 and the file to 0600.
pub fn write_sealed(path: &Path, plaintext: &[u8], password: &[u8]) -> Result<(), KeystoreFileError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    let sealed = seal(plaintext, password)?;
    let tmp_path = path.with_extension("keystore.tmp");

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp_path)?;
        file.write_all(&sealed)?;
        file.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(&tmp_path, &sealed)?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and open a sealed file.
pub fn read_sealed(path: &Path, password: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreFileError> {
    let data = std::fs::read(path)?;
    open(&data, password)
}
