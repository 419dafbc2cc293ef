//! Per-tenant SSH key provisioning.
//!
//! Each tenant gets its own RSA deploy key under `<home>/.ssh/`:
//! `<tenant>` holds the PKCS#1 PEM private key and `<tenant>.pub` the
//! OpenSSH authorized-key line operators register on the upstream host.
//! Keys are created on first request and reused forever after.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use ssh_key::public::{KeyData, RsaPublicKey};
use tracing::{debug, info};

use srcsync_core::Settings;

use crate::error::KeyError;

/// Key file name of the shared fallback identity.
pub const FALLBACK_IDENTITY: &str = "builder_rsa";

/// Key file name of the generic default identity.
pub const DEFAULT_IDENTITY: &str = "id_rsa";

/// RSA modulus size for generated deploy keys.
pub const KEY_BITS: usize = 2048;

/// Which key a sync attempt authenticates with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyIdentity {
    /// The tenant's own deploy key.
    Tenant(String),
    /// The shared fallback key.
    Fallback,
}

impl KeyIdentity {
    /// Returns the identity name as used for key files.
    pub fn name(&self) -> &str {
        match self {
            Self::Tenant(tenant) => tenant,
            Self::Fallback => FALLBACK_IDENTITY,
        }
    }
}

/// A freshly generated key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// PKCS#1 PEM encoded private key.
    pub private_key_pem: String,
    /// OpenSSH authorized-key line, newline terminated.
    pub public_key: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Generates an RSA key pair of `bits` bits.
pub fn generate_key_pair(bits: usize) -> Result<KeyPair, KeyError> {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits)?;
    let pem = private.to_pkcs1_pem(LineEnding::LF)?;

    let public = RsaPublicKey::try_from(&private.to_public_key())?;
    let public = ssh_key::PublicKey::new(KeyData::Rsa(public), "");
    let authorized = public.to_openssh()?;

    Ok(KeyPair {
        private_key_pem: pem.as_str().to_owned(),
        public_key: format!("{}\n", authorized.trim_end()),
    })
}

/// Creates, persists and looks up SSH key files.
///
/// The provisioner is the only writer of key files. Creation is serialized
/// within a process so two concurrent first requests for one tenant
/// produce a single key pair.
#[derive(Debug)]
pub struct KeyProvisioner {
    ssh_dir: PathBuf,
    bits: usize,
    creation: Mutex<()>,
}

impl KeyProvisioner {
    /// Creates a provisioner storing keys under the settings' `.ssh` directory.
    pub fn new(settings: &Settings) -> Self {
        Self::with_ssh_dir(settings.ssh_dir())
    }

    /// Creates a provisioner storing keys under `ssh_dir`.
    pub fn with_ssh_dir(ssh_dir: impl Into<PathBuf>) -> Self {
        Self {
            ssh_dir: ssh_dir.into(),
            bits: KEY_BITS,
            creation: Mutex::new(()),
        }
    }

    /// Overrides the RSA modulus size.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.bits = bits;
        self
    }

    /// Returns the key directory.
    pub fn ssh_dir(&self) -> &Path {
        &self.ssh_dir
    }

    /// Returns the tenant's public key, generating the pair on first use.
    ///
    /// An existing public key file is returned unchanged, so repeated calls
    /// yield byte-identical text and never touch the private key.
    pub fn get_or_create_public_key(&self, tenant: &str) -> Result<String, KeyError> {
        validate_tenant(tenant)?;
        let public_path = self.ssh_dir.join(format!("{}.pub", tenant));

        if let Some(existing) = read_if_exists(&public_path)? {
            return Ok(existing);
        }

        let _guard = self.creation.lock();
        if let Some(existing) = read_if_exists(&public_path)? {
            return Ok(existing);
        }

        info!("generating {}-bit deploy key for tenant {}", self.bits, tenant);
        let pair = generate_key_pair(self.bits)?;

        self.ensure_ssh_dir()?;
        let private_path = self.ssh_dir.join(tenant);
        write_file(&private_path, pair.private_key_pem.as_bytes(), 0o600)?;
        write_file(&public_path, pair.public_key.as_bytes(), 0o644)?;

        Ok(pair.public_key)
    }

    /// Resolves the private key file for an identity.
    ///
    /// Lookup chain: the tenant key if it exists, else the shared
    /// `builder_rsa` key if it exists, else `id_rsa`.
    pub fn private_key_path(&self, identity: &KeyIdentity) -> PathBuf {
        if let KeyIdentity::Tenant(tenant) = identity
            && validate_tenant(tenant).is_ok()
        {
            let path = self.ssh_dir.join(tenant);
            if path.is_file() {
                return path;
            }
            debug!("no deploy key for tenant {}, using fallback identity", tenant);
        }
        self.fallback_key_path()
    }

    /// Returns `builder_rsa` if present, else `id_rsa`.
    pub fn fallback_key_path(&self) -> PathBuf {
        let fallback = self.ssh_dir.join(FALLBACK_IDENTITY);
        if fallback.is_file() {
            fallback
        } else {
            self.ssh_dir.join(DEFAULT_IDENTITY)
        }
    }

    fn ensure_ssh_dir(&self) -> Result<(), KeyError> {
        if self.ssh_dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.ssh_dir).map_err(|e| KeyError::io(&self.ssh_dir, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.ssh_dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| KeyError::io(&self.ssh_dir, e))?;
        }
        Ok(())
    }
}

fn validate_tenant(tenant: &str) -> Result<(), KeyError> {
    let invalid = tenant.is_empty()
        || tenant == "."
        || tenant == ".."
        || tenant.contains(['/', '\\', '\0'])
        || tenant.ends_with(".pub");
    if invalid {
        Err(KeyError::InvalidTenant(tenant.to_string()))
    } else {
        Ok(())
    }
}

fn read_if_exists(path: &Path) -> Result<Option<String>, KeyError> {
    match fs::read_to_string(path) {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(KeyError::io(path, e)),
    }
}

fn write_file(path: &Path, body: &[u8], mode: u32) -> Result<(), KeyError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path).map_err(|e| KeyError::io(path, e))?;
    file.write_all(body).map_err(|e| KeyError::io(path, e))?;
    file.sync_all().map_err(|e| KeyError::io(path, e))
}
