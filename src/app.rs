//! Per-invocation context shared by CLI commands.

use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{LabError, Result};
use crate::service::{ExperimentService, ServiceOptions};
use crate::storage::Database;

pub struct AppContext {
    pub root: PathBuf,
    pub config: Config,
    pub service: ExperimentService<Database>,
    pub robot_mode: bool,
    pub verbosity: u8,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("root", &self.root)
            .field("robot_mode", &self.robot_mode)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = resolve_root()?;
        let config = Config::load(cli.config.as_deref(), &root)?;
        Self::open(root, config, cli.robot, cli.verbose)
    }

    /// Open the configured database under `root`.
    pub fn open(root: PathBuf, config: Config, robot_mode: bool, verbosity: u8) -> Result<Self> {
        let db_path = config.storage.resolve_database_path(&root);
        debug!(root = %root.display(), db = %db_path.display(), "opening splitlab context");
        let db = Database::open(&db_path)?;
        let service = ExperimentService::with_options(db, ServiceOptions::from(&config));
        Ok(Self {
            root,
            config,
            service,
            robot_mode,
            verbosity,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generator for one allocation draw.
    ///
    /// With `[assignment] seed` set, the draw depends only on the seed and
    /// the (experiment name, user) pair, so re-running against a fresh
    /// database reproduces the same split.
    #[must_use]
    pub fn assignment_rng(&self, experiment_name: &str, user_id: &str) -> StdRng {
        match self.config.assignment.seed {
            Some(seed) => StdRng::seed_from_u64(assignment_seed(seed, experiment_name, user_id)),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

/// Per-pair seed: the first 8 bytes (little endian) of
/// SHA-256(seed LE || experiment name || 0x00 || user).
#[must_use]
pub fn assignment_seed(seed: u64, experiment_name: &str, user_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(experiment_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// `SPLITLAB_ROOT`, else the platform data directory.
pub fn resolve_root() -> Result<PathBuf> {
    if let Some(root) = std::env::var_os("SPLITLAB_ROOT") {
        return Ok(PathBuf::from(root));
    }
    dirs::data_dir()
        .map(|dir| dir.join("splitlab"))
        .ok_or_else(|| LabError::Config("data directory not found; set SPLITLAB_ROOT".to_string()))
}
