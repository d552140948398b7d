//! Local key store
//!
//! Finds (or creates) the ed25519 key pair used for public key authentication
//! and for seeding remote `authorized_keys` files.
//!
//! Nothing in here fails a connection. Problems with the key pair leave the
//! [`KeyMaterial`] with a [`KeyCapability::Degraded`] signer and the caller
//! falls back to password authentication.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use russh::keys::ssh_key::private::Ed25519Keypair;
use russh::keys::ssh_key::{HashAlg, LineEnding};
use russh::keys::PrivateKey;
use tracing::{debug, info, warn};

use super::error::SshError;

const KEY_FILE_NAME: &str = "id_ed25519";
const PRIVATE_KEY_MODE: u32 = 0o600;
const PUBLIC_KEY_MODE: u32 = 0o644;
const SSH_DIR_MODE: u32 = 0o700;

/// Whether the private key can be used to sign authentication requests
#[derive(Clone)]
pub enum KeyCapability {
    Ready(Arc<PrivateKey>),
    Degraded { reason: String },
}

impl std::fmt::Debug for KeyCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyCapability::Ready(_) => f.write_str("Ready"),
            KeyCapability::Degraded { reason } => {
                f.debug_struct("Degraded").field("reason", reason).finish()
            }
        }
    }
}

/// The resolved key pair for one private key path
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
    public_key_line: Option<String>,
    capability: KeyCapability,
}

impl KeyMaterial {
    fn unavailable(reason: String) -> Self {
        Self {
            private_key_path: PathBuf::new(),
            public_key_path: PathBuf::new(),
            public_key_line: None,
            capability: KeyCapability::Degraded { reason },
        }
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    pub fn public_key_path(&self) -> &Path {
        &self.public_key_path
    }

    /// The `authorized_keys` line, trailing newline removed
    pub fn public_key_line(&self) -> Option<&str> {
        self.public_key_line.as_deref()
    }

    pub fn capability(&self) -> &KeyCapability {
        &self.capability
    }

    pub fn signer(&self) -> Option<&Arc<PrivateKey>> {
        match &self.capability {
            KeyCapability::Ready(key) => Some(key),
            KeyCapability::Degraded { .. } => None,
        }
    }

    /// SHA256 fingerprint of the signing key
    pub fn fingerprint(&self) -> Option<String> {
        self.signer()
            .map(|key| key.public_key().fingerprint(HashAlg::Sha256).to_string())
    }
}

/// Key store rooted at one home directory.
///
/// Loaded material is cached per private key path, so each key file is read
/// at most once per process.
pub struct KeyStore {
    home: Option<PathBuf>,
    cache: Mutex<HashMap<PathBuf, Arc<KeyMaterial>>>,
}

impl KeyStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Key store for the current user's home directory
    pub fn from_env() -> Self {
        let home = dirs::home_dir();
        if home.is_none() {
            warn!("Could not determine home directory, key authentication disabled");
        }
        Self {
            home,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `<home>/.ssh/id_ed25519`
    pub fn default_key_path(&self) -> Result<PathBuf, SshError> {
        self.home
            .as_ref()
            .map(|home| home.join(".ssh").join(KEY_FILE_NAME))
            .ok_or_else(|| SshError::KeyError("Home directory unknown".to_string()))
    }

    /// Resolve the private key to use.
    ///
    /// An explicit path is taken as-is when it exists. Otherwise the default
    /// key is used, generated first if it does not exist yet.
    pub fn locate(&self, explicit: Option<&Path>) -> Result<PathBuf, SshError> {
        if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            warn!(
                "Private key {} not found, using the default key",
                path.display()
            );
        }
        self.generate()
    }

    /// Create the default ed25519 key pair unless a private key is already there.
    ///
    /// Returns the private key path either way.
    pub fn generate(&self) -> Result<PathBuf, SshError> {
        let private_path = self.default_key_path()?;
        if private_path.exists() {
            debug!("Reusing existing key {}", private_path.display());
            return Ok(private_path);
        }

        if let Some(dir) = private_path.parent() {
            create_ssh_dir(dir)?;
        }

        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let mut private_key = PrivateKey::from(Ed25519Keypair::from_seed(&seed));
        private_key.set_comment(key_comment());

        let pem = private_key
            .to_openssh(LineEnding::LF)
            .map_err(|e| SshError::KeyError(format!("Failed to encode private key: {}", e)))?;
        let public_line = private_key
            .public_key()
            .to_openssh()
            .map_err(|e| SshError::KeyError(format!("Failed to encode public key: {}", e)))?;

        write_new_file(&private_path, pem.as_bytes(), PRIVATE_KEY_MODE)?;
        write_file(
            &public_key_path_for(&private_path),
            public_line.as_bytes(),
            PUBLIC_KEY_MODE,
        )?;

        info!("Generated new ed25519 key {}", private_path.display());
        Ok(private_path)
    }

    /// Make sure `<private>.pub` exists and return its trimmed line.
    ///
    /// A missing public key is rederived with `ssh-keygen -y`. Failures are
    /// logged and yield `None`.
    pub fn ensure_public_key_file(&self, private_path: &Path) -> Option<String> {
        let public_path = public_key_path_for(private_path);

        if !public_path.exists() && private_path.exists() {
            match Command::new("ssh-keygen")
                .arg("-y")
                .arg("-f")
                .arg(private_path)
                .output()
            {
                Ok(output) if output.status.success() => {
                    if let Err(e) = write_file(&public_path, &output.stdout, PUBLIC_KEY_MODE) {
                        warn!("Failed to write {}: {}", public_path.display(), e);
                    }
                }
                Ok(output) => {
                    warn!(
                        "ssh-keygen exited with {} for {}: {}",
                        output.status,
                        private_path.display(),
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
                Err(e) => warn!("Could not run ssh-keygen: {}", e),
            }
        }

        match fs::read_to_string(&public_path) {
            Ok(contents) => {
                let line = contents.trim_end().to_string();
                (!line.is_empty()).then_some(line)
            }
            Err(e) => {
                warn!("Error reading public key file {}: {}", public_path.display(), e);
                None
            }
        }
    }

    /// Resolve, create if needed, and load the key pair.
    pub fn load(&self, explicit: Option<&Path>) -> Arc<KeyMaterial> {
        let private_path = match self.locate(explicit) {
            Ok(path) => path,
            Err(e) => {
                warn!("No usable private key: {}", e);
                return Arc::new(KeyMaterial::unavailable(e.to_string()));
            }
        };

        if let Some(material) = self.cache.lock().get(&private_path) {
            return material.clone();
        }

        let material = Arc::new(KeyMaterial {
            public_key_path: public_key_path_for(&private_path),
            public_key_line: self.ensure_public_key_file(&private_path),
            capability: load_signer(&private_path),
            private_key_path: private_path.clone(),
        });

        self.cache
            .lock()
            .entry(private_path)
            .or_insert(material)
            .clone()
    }
}

/// Parse the private key into a signer.
pub fn load_signer(private_path: &Path) -> KeyCapability {
    match russh::keys::load_secret_key(private_path, None) {
        Ok(key) => {
            debug!(
                "Loaded private key {} ({})",
                private_path.display(),
                key.public_key().fingerprint(HashAlg::Sha256)
            );
            KeyCapability::Ready(Arc::new(key))
        }
        Err(e) => {
            warn!(
                "Error parsing private key file {}: {}",
                private_path.display(),
                e
            );
            KeyCapability::Degraded {
                reason: e.to_string(),
            }
        }
    }
}

/// `<private>.pub`
pub fn public_key_path_for(private_path: &Path) -> PathBuf {
    let mut path = private_path.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Global singleton for the current user's key store
static KEY_STORE: OnceLock<Arc<KeyStore>> = OnceLock::new();

/// Get the key store for the current user's home directory
pub fn get_key_store() -> Arc<KeyStore> {
    KEY_STORE
        .get_or_init(|| Arc::new(KeyStore::from_env()))
        .clone()
}

/// `<user>@<hostname>`
fn key_comment() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}@{}", whoami::username(), host)
}

fn create_ssh_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(SSH_DIR_MODE);
    }
    builder.create(dir)
}

fn write_new_file(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    write_with(options, path, contents, mode)
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    write_with(options, path, contents, mode)
}

fn write_with(
    mut options: OpenOptions,
    path: &Path,
    contents: &[u8],
    mode: u32,
) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options.open(path)?;

    // Mode on open is filtered by the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.write_all(contents)?;
    file.flush()
}
