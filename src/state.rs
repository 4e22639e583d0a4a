use log::{debug, trace};
use std::{
    ffi::OsStr,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

const LOCK_FILENAME: &str = ".deploy.lock";
const MARKER_PREFIX: &str = ".deploy_";

/// The marker proving that the repository was fully deployed to the destination.
pub fn marker_path(destination_root: &Path, repository_name: &str) -> PathBuf {
    destination_root.join(format!("{MARKER_PREFIX}{repository_name}"))
}

/// Whether a file name in the destination root belongs to the deploy state
/// (the marker of any repository, or the lock).
pub fn is_state_file(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name == LOCK_FILENAME || name.starts_with(MARKER_PREFIX)
}

/// Whether the destination still needs a full sync of the repository.
pub fn is_initial_deploy(destination_root: &Path, repository_name: &str) -> bool {
    !marker_path(destination_root, repository_name).exists()
}

/// Record that the full sync of the repository finished. Touching an existing marker is fine.
pub fn mark_complete(destination_root: &Path, repository_name: &str) -> io::Result<()> {
    let marker = marker_path(destination_root, repository_name);
    OpenOptions::new().create(true).append(true).open(&marker)?;
    debug!("Created deploy marker {}.", marker.display());
    Ok(())
}

/// An exclusive lock on a destination directory, released when dropped.
///
/// Deploys to the same destination from different processes wait for each
/// other, so their writes never interleave.
pub struct DeployLock {
    #[cfg(unix)]
    _file: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl DeployLock {
    /// Create the destination if needed and block until the lock is ours.
    pub fn acquire(destination_root: &Path) -> io::Result<Self> {
        fs::create_dir_all(destination_root)?;
        let path = destination_root.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        trace!("Waiting for lock {}.", path.display());
        let file = Self::lock(file)?;
        trace!("Acquired lock {}.", path.display());

        Ok(DeployLock { _file: file })
    }

    #[cfg(unix)]
    fn lock(file: File) -> io::Result<nix::fcntl::Flock<File>> {
        use nix::fcntl::{Flock, FlockArg};

        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| io::Error::from(errno))
    }

    #[cfg(not(unix))]
    fn lock(file: File) -> io::Result<File> {
        Ok(file)
    }
}
