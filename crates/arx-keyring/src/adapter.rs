//! Encryption adapter seam and the machine-keyed AES-256-GCM implementation.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm,
};
use anyhow::{anyhow, bail, Result};
use sha2::{Digest, Sha256};

const AES_GCM_NONCE_BYTES: usize = 12;
const AES_GCM_AAD: &[u8] = b"arx-profile-vault-v1";
const MACHINE_KEY_CONTEXT: &str = "arx-vault-machine-key-v1";
const MACHINE_ID_CANDIDATE_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// OS-level encryption capability consumed by `EncryptionService`.
///
/// Ciphertext crosses this boundary as raw bytes; the service owns the
/// base64 envelope used inside stored profiles.
pub trait EncryptionAdapter: Send + Sync {
    fn is_available(&self) -> bool;
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String>;
}

/// AES-256-GCM adapter keyed from stable machine identity.
///
/// The key seed mixes OS/arch, host-identifying environment variables, and
/// the machine-id file when readable. Secrets protected this way survive
/// process restarts on the same machine but are not portable across hosts.
#[derive(Debug, Clone)]
pub struct MachineKeyAdapter {
    key_material: [u8; 32],
}

impl MachineKeyAdapter {
    pub fn new() -> Self {
        let digest = Sha256::digest(machine_key_seed().as_bytes());
        let mut key_material = [0u8; 32];
        key_material.copy_from_slice(&digest);
        Self { key_material }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key_material)
            .map_err(|_| anyhow!("machine key material has invalid length"))
    }
}

impl Default for MachineKeyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionAdapter for MachineKeyAdapter {
    fn is_available(&self) -> bool {
        true
    }

    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            bail!("plaintext must not be empty");
        }
        let cipher = self.cipher()?;
        let mut nonce = [0u8; AES_GCM_NONCE_BYTES];
        use aes_gcm::aead::rand_core::RngCore as _;
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                (&nonce).into(),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: AES_GCM_AAD,
                },
            )
            .map_err(|_| anyhow!("payload encryption failed"))?;

        let mut payload = Vec::with_capacity(AES_GCM_NONCE_BYTES + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        if ciphertext.len() <= AES_GCM_NONCE_BYTES {
            bail!("payload is truncated");
        }
        let cipher = self.cipher()?;
        let nonce = &ciphertext[..AES_GCM_NONCE_BYTES];
        let body = &ciphertext[AES_GCM_NONCE_BYTES..];
        let plaintext = cipher
            .decrypt(
                nonce.into(),
                Payload {
                    msg: body,
                    aad: AES_GCM_AAD,
                },
            )
            .map_err(|_| anyhow!("payload integrity check failed"))?;
        String::from_utf8(plaintext).map_err(|_| anyhow!("payload is not valid UTF-8"))
    }
}

fn machine_key_seed() -> String {
    let mut segments = vec![
        MACHINE_KEY_CONTEXT.to_string(),
        format!("os={}", std::env::consts::OS),
        format!("arch={}", std::env::consts::ARCH),
    ];
    for variable in [
        "HOSTNAME",
        "COMPUTERNAME",
        "USER",
        "USERNAME",
        "HOME",
        "USERPROFILE",
    ] {
        if let Ok(value) = std::env::var(variable) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                segments.push(format!("{variable}={trimmed}"));
            }
        }
    }
    if let Some(machine_id) = read_machine_id_file() {
        segments.push(format!("machine_id={machine_id}"));
    }
    segments.join("|")
}

fn read_machine_id_file() -> Option<String> {
    for path in MACHINE_ID_CANDIDATE_PATHS {
        if let Ok(raw) = std::fs::read_to_string(path) {
            let value = raw.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
