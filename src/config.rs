use serde::Deserialize;
use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// The API every repository path is appended to.
pub const DEFAULT_API_URL: &str = "https://api.bitbucket.org/1.0/repositories";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const CONFIG_FILENAME: &str = "deploy.toml";

/// A custom error for describing the error cases for loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file cannot be read.
    #[error("cannot read {0}: {1}")]
    Unreadable(String, std::io::Error),
    /// The configuration file is not valid TOML, or has unknown types in it.
    #[error("configuration is invalid: {0}")]
    Invalid(#[from] toml::de::Error),
}

/// Where the files of one repository are deployed.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepositoryMapping {
    /// Destination directory for each branch. Unlisted branches are deployed
    /// to a directory named after the branch.
    pub branch_to_dir: HashMap<String, String>,
    /// The subtree of the repository that is deployed. Everything outside of it is ignored.
    pub repository_root: String,
}

impl RepositoryMapping {
    /// The directory name the branch is deployed to, relative to the base directory.
    pub fn directory_for<'a>(&'a self, branch: &'a str) -> &'a str {
        self.branch_to_dir
            .get(branch)
            .map(String::as_str)
            .unwrap_or(branch)
    }
}

/// The configuration of the deployments, read once on startup.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log every step to the log file, not only the changes.
    pub debug: bool,
    /// Username for the hosting API.
    pub user: String,
    /// Password (or app password) for the hosting API.
    pub pass: String,
    pub api_url: String,
    /// Timeout of a single request to the hosting API, in seconds.
    pub timeout: u64,
    /// Branch mapping for repositories without their own entry.
    pub branch_to_dir: HashMap<String, String>,
    /// Repository root for repositories without their own entry.
    pub repository_root: String,
    /// Per-repository overrides, keyed by the repository name.
    pub repository_mapping: HashMap<String, RepositoryMapping>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            user: String::new(),
            pass: String::new(),
            api_url: String::from(DEFAULT_API_URL),
            timeout: DEFAULT_TIMEOUT_SECS,
            branch_to_dir: HashMap::new(),
            repository_root: String::new(),
            repository_mapping: HashMap::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pass = if self.pass.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Config")
            .field("debug", &self.debug)
            .field("user", &self.user)
            .field("pass", &pass)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("branch_to_dir", &self.branch_to_dir)
            .field("repository_root", &self.repository_root)
            .field("repository_mapping", &self.repository_mapping)
            .finish()
    }
}

impl Config {
    /// Load the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|err| ConfigError::Unreadable(path.to_string_lossy().to_string(), err))?;
        contents.parse()
    }

    /// Find the configuration file: the given one, `deploy.toml` in the
    /// current directory or the one in the user's config directory.
    pub fn locate(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        let local = PathBuf::from(CONFIG_FILENAME);
        if local.exists() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|dir| dir.join("deploy-hook").join("config.toml"))
            .filter(|path| path.exists())
    }

    /// Resolve the mapping of a repository, falling back to the global one.
    pub fn mapping_for(&self, repository: &str) -> RepositoryMapping {
        match self.repository_mapping.get(repository) {
            Some(mapping) => mapping.clone(),
            None => RepositoryMapping {
                branch_to_dir: self.branch_to_dir.clone(),
                repository_root: self.repository_root.clone(),
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
