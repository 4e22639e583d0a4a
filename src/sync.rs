use crate::{
    config::RepositoryMapping,
    paths::{self, PathError},
    payload::{ChangeKind, Commit},
    remote::{RemoteError, RemoteSource},
    state::{self, DeployLock},
};
use log::{debug, error, info, warn};
use std::{
    fs::{self, File},
    io::{self, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Directories nested deeper than this are not walked during a full sync.
pub const MAX_TREE_DEPTH: usize = 64;

const TEMPORARY_SUFFIX: &str = ".deploy-tmp";

/// A custom error for the failures that abort the sync of a commit.
///
/// Failing to read from the remote is not one of them: it only fails the
/// affected file, see [FileOutcome::Failed].
#[derive(Debug, Error)]
pub enum SyncError {
    /// Creating, writing, renaming or removing something in the destination failed.
    #[error("filesystem error at {}: {}", .0.display(), .1)]
    Filesystem(PathBuf, #[source] io::Error),
    /// A file cannot be placed in the destination.
    #[error(transparent)]
    Path(#[from] PathError),
    /// The revision has a tree that is deeper than [MAX_TREE_DEPTH].
    #[error("{0} is nested deeper than {max} directories", max = MAX_TREE_DEPTH)]
    TreeTooDeep(String),
}

/// How a commit was applied to its destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// The whole tree of the revision was downloaded.
    Full,
    /// Only the files changed in the commit were applied.
    Incremental,
}

/// What happened to a single repository path.
#[derive(Debug)]
pub enum FileOutcome {
    /// The file was downloaded to the destination.
    Written { path: String, destination: PathBuf },
    /// The file was deleted from the destination.
    Removed { path: String, destination: PathBuf },
    /// The file should have been deleted, but it wasn't there.
    AlreadyAbsent { path: String },
    /// The path is outside of the repository root, or it is one of the files
    /// the deploy keeps its own state in.
    Skipped { path: String },
    /// The file (or directory listing) couldn't be read from the remote.
    Failed { path: String, error: RemoteError },
}

/// The result of applying one commit.
#[derive(Debug)]
pub struct CommitReport {
    pub branch: String,
    pub revision: String,
    pub destination: PathBuf,
    pub strategy: Strategy,
    pub outcomes: Vec<FileOutcome>,
    /// Whether the deploy marker was created by this commit.
    pub marked: bool,
}

impl CommitReport {
    fn new(branch: &str, commit: &Commit, destination: &Path, strategy: Strategy) -> Self {
        CommitReport {
            branch: String::from(branch),
            revision: commit.revision.clone(),
            destination: destination.to_path_buf(),
            strategy,
            outcomes: vec![],
            marked: false,
        }
    }

    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Written { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                FileOutcome::Removed { .. } | FileOutcome::AlreadyAbsent { .. }
            )
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(o)).count()
    }
}

/// Failures while streaming a file, before we know who to blame.
enum StreamError {
    Remote(RemoteError),
    Filesystem(PathBuf, io::Error),
}

/// Applies the commits of one repository to their destinations.
///
/// A destination without a deploy marker gets the full tree of the revision,
/// every other destination only gets the changes of the commit.
pub struct SyncEngine<'a> {
    source: &'a dyn RemoteSource,
    repository_name: &'a str,
    mapping: &'a RepositoryMapping,
    base_dir: &'a Path,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn RemoteSource,
        repository_name: &'a str,
        mapping: &'a RepositoryMapping,
        base_dir: &'a Path,
    ) -> Self {
        SyncEngine {
            source,
            repository_name,
            mapping,
            base_dir,
        }
    }

    /// The directory the branch is mirrored in.
    pub fn destination(&self, branch: &str) -> Result<PathBuf, PathError> {
        paths::destination_root(self.base_dir, self.mapping, branch)
    }

    /// Apply the commit to the destination of the branch, holding the destination's lock.
    pub fn deploy(&self, branch: &str, commit: &Commit) -> Result<CommitReport, SyncError> {
        let destination = self.destination(branch)?;
        let _lock = DeployLock::acquire(&destination)
            .map_err(|err| SyncError::Filesystem(destination.clone(), err))?;

        if state::is_initial_deploy(&destination, self.repository_name) {
            self.deploy_from_scratch(branch, commit, &destination)
        } else {
            self.deploy_commit(branch, commit, &destination)
        }
    }

    /// Download every file of the revision under the repository root, then
    /// create the deploy marker. The files of the commit are not looked at.
    pub fn deploy_from_scratch(
        &self,
        branch: &str,
        commit: &Commit,
        destination: &Path,
    ) -> Result<CommitReport, SyncError> {
        info!(
            "Deploying {} from scratch to {}.",
            commit.revision,
            destination.display()
        );
        fs::create_dir_all(destination)
            .map_err(|err| SyncError::Filesystem(destination.to_path_buf(), err))?;

        let mut report = CommitReport::new(branch, commit, destination, Strategy::Full);
        let mut stack: Vec<(String, usize)> = vec![(String::new(), 0)];
        while let Some((subdirectory, depth)) = stack.pop() {
            let directory = join_path(&self.mapping.repository_root, &subdirectory);
            let listing = match self.source.list_tree(&commit.revision, &directory) {
                Ok(listing) => listing,
                Err(err) => {
                    error!("Cannot list {directory:?}: {err}.");
                    report.outcomes.push(FileOutcome::Failed {
                        path: directory,
                        error: err,
                    });
                    continue;
                }
            };
            debug!(
                "Listed {directory:?}: {} files, {} directories.",
                listing.files.len(),
                listing.directories.len()
            );

            for file in &listing.files {
                let outcome = self.download(&commit.revision, file, destination)?;
                report.outcomes.push(outcome);
            }

            if !listing.directories.is_empty() && depth >= MAX_TREE_DEPTH {
                return Err(SyncError::TreeTooDeep(directory));
            }
            // Reversed, so the directories are walked in the listed order.
            for name in listing.directories.iter().rev() {
                stack.push((join_path(&subdirectory, name), depth + 1));
            }
        }

        if report.failed() == 0 {
            state::mark_complete(destination, self.repository_name).map_err(|err| {
                SyncError::Filesystem(
                    state::marker_path(destination, self.repository_name),
                    err,
                )
            })?;
            report.marked = true;
            info!("Deployed {} files from scratch.", report.written());
        } else {
            warn!(
                "{} files failed, {} stays uninitialized until the next notification.",
                report.failed(),
                destination.display()
            );
        }

        Ok(report)
    }

    /// Apply the file changes of the commit in order.
    pub fn deploy_commit(
        &self,
        branch: &str,
        commit: &Commit,
        destination: &Path,
    ) -> Result<CommitReport, SyncError> {
        info!(
            "Deploying commit {} to {}.",
            commit.revision,
            destination.display()
        );

        let mut report = CommitReport::new(branch, commit, destination, Strategy::Incremental);
        for change in &commit.files {
            if !paths::is_in_root(&change.path, &self.mapping.repository_root) {
                debug!(
                    "Skipping {}, it is outside of the repository root.",
                    change.path
                );
                report.outcomes.push(FileOutcome::Skipped {
                    path: change.path.clone(),
                });
                continue;
            }

            info!("[{}] {}", change.kind, change.path);
            let outcome = match change.kind {
                ChangeKind::Removed => self.remove(&change.path, destination)?,
                ChangeKind::Added | ChangeKind::Modified => {
                    self.download(&commit.revision, &change.path, destination)?
                }
            };
            report.outcomes.push(outcome);
        }

        info!(
            "Deployed commit {}: {} written, {} removed, {} skipped, {} failed.",
            commit.revision,
            report.written(),
            report.removed(),
            report.skipped(),
            report.failed()
        );

        Ok(report)
    }

    fn download(
        &self,
        revision: &str,
        path: &str,
        destination: &Path,
    ) -> Result<FileOutcome, SyncError> {
        let root = &self.mapping.repository_root;
        if !paths::is_in_root(path, root) {
            warn!("Skipping {path}, it is outside of the repository root.");
            return Ok(FileOutcome::Skipped {
                path: String::from(path),
            });
        }
        if is_reserved(&paths::map_path(path, root, destination)?, destination) {
            warn!("Skipping {path}, it would overwrite the deploy state.");
            return Ok(FileOutcome::Skipped {
                path: String::from(path),
            });
        }
        let file = paths::on_disk_path(path, root, destination)?;

        let result = self
            .source
            .fetch_file(revision, path)
            .map_err(StreamError::Remote)
            .and_then(|mut reader| stream_to_file(&mut reader, &file, path));

        match result {
            Ok(bytes) => {
                info!("Download (repo) {path} -> {} (disk), {bytes} bytes.", file.display());
                Ok(FileOutcome::Written {
                    path: String::from(path),
                    destination: file,
                })
            }
            Err(StreamError::Remote(err)) => {
                error!("Cannot download {path}: {err}.");
                Ok(FileOutcome::Failed {
                    path: String::from(path),
                    error: err,
                })
            }
            Err(StreamError::Filesystem(path, err)) => Err(SyncError::Filesystem(path, err)),
        }
    }

    fn remove(&self, path: &str, destination: &Path) -> Result<FileOutcome, SyncError> {
        let file = paths::map_path(path, &self.mapping.repository_root, destination)?;
        if is_reserved(&file, destination) {
            warn!("Skipping {path}, it would remove the deploy state.");
            return Ok(FileOutcome::Skipped {
                path: String::from(path),
            });
        }

        match fs::remove_file(&file) {
            Ok(()) => {
                info!("Removed {}.", file.display());
                Ok(FileOutcome::Removed {
                    path: String::from(path),
                    destination: file,
                })
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("{} is already removed.", file.display());
                Ok(FileOutcome::AlreadyAbsent {
                    path: String::from(path),
                })
            }
            Err(err) => Err(SyncError::Filesystem(file, err)),
        }
    }
}

/// The deploy markers and the lock in the destination root, and the temporary
/// files anywhere, are never written or removed for the repository.
fn is_reserved(file: &Path, destination: &Path) -> bool {
    let Some(name) = file.file_name() else {
        return false;
    };
    if name.to_string_lossy().ends_with(TEMPORARY_SUFFIX) {
        return true;
    }

    file.parent() == Some(destination) && state::is_state_file(name)
}

fn join_path(directory: &str, name: &str) -> String {
    let directory = directory.trim_matches('/');
    let name = name.trim_matches('/');
    match (directory.is_empty(), name.is_empty()) {
        (true, _) => String::from(name),
        (false, true) => String::from(directory),
        (false, false) => format!("{directory}/{name}"),
    }
}

fn temporary_path(file: &Path) -> PathBuf {
    let mut temporary = file.as_os_str().to_owned();
    temporary.push(TEMPORARY_SUFFIX);
    PathBuf::from(temporary)
}

/// Stream the contents next to the file, and move it into place only if
/// everything arrived. Otherwise the previous version is kept.
fn stream_to_file(reader: &mut dyn Read, file: &Path, path: &str) -> Result<u64, StreamError> {
    let temporary = temporary_path(file);

    let result = copy_to(reader, &temporary, path).and_then(|bytes| {
        fs::rename(&temporary, file)
            .map_err(|err| StreamError::Filesystem(file.to_path_buf(), err))?;
        Ok(bytes)
    });

    if result.is_err() {
        let _ = fs::remove_file(&temporary);
    }

    result
}

fn copy_to(reader: &mut dyn Read, temporary: &Path, path: &str) -> Result<u64, StreamError> {
    let filesystem_error = |err: io::Error| StreamError::Filesystem(temporary.to_path_buf(), err);

    let mut output = File::create(temporary).map_err(filesystem_error)?;
    let mut buffer = [0u8; 8192];
    let mut bytes = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(StreamError::Remote(RemoteError::Read(
                    String::from(path),
                    err,
                )))
            }
        };
        output
            .write_all(&buffer[..read])
            .map_err(filesystem_error)?;
        bytes += read as u64;
    }
    output.flush().map_err(filesystem_error)?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        payload::FileChange,
        remote::{test::TestSource, MockRemoteSource},
    };
    use log::Level;
    use std::error::Error;
    use tempfile::{tempdir, TempDir};

    fn mapping() -> RepositoryMapping {
        RepositoryMapping {
            repository_root: String::from("repo_root"),
            ..RepositoryMapping::default()
        }
    }

    fn commit(revision: &str, files: &[(&str, ChangeKind)]) -> Commit {
        Commit {
            branch: Some(String::from("main")),
            revision: String::from(revision),
            files: files
                .iter()
                .map(|(path, kind)| FileChange {
                    path: String::from(*path),
                    kind: *kind,
                })
                .collect(),
        }
    }

    fn source() -> TestSource {
        TestSource::new()
            .with_file("r1", "repo_root/index.html", "<h1>r1</h1>")
            .with_file("r1", "repo_root/a.txt", "a1")
            .with_file("r1", "repo_root/b.txt", "b1")
            .with_file("r1", "repo_root/css/site.css", "body {}")
            .with_file("r1", "repo_root/css/vendor/reset.css", "* {}")
            .with_file("r1", "docs/readme.md", "not deployed")
            .with_file("r2", "repo_root/a.txt", "a2")
            .with_file("r2", "repo_root/c.txt", "c2")
    }

    /// Deploy r1 from scratch into `main`, returning the destination.
    fn initialize(
        dir: &TempDir,
        source: &TestSource,
        mapping: &RepositoryMapping,
    ) -> Result<PathBuf, Box<dyn Error>> {
        let engine = SyncEngine::new(source, "app", mapping, dir.path());
        let report = engine.deploy("main", &commit("r1", &[]))?;
        assert!(report.marked);
        source.clear_requests();
        Ok(report.destination)
    }

    #[test]
    fn it_should_deploy_the_whole_tree_from_scratch() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source();
        let mapping = mapping();
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        // The files of the commit are ignored on the first deploy
        let report = engine.deploy("main", &commit("r1", &[("repo_root/x.txt", ChangeKind::Added)]))?;

        let destination = dir.path().join("main");
        assert_eq!(Strategy::Full, report.strategy);
        assert_eq!(destination, report.destination);
        assert_eq!(5, report.written());
        assert!(report.marked);
        assert_eq!("<h1>r1</h1>", fs::read_to_string(destination.join("index.html"))?);
        assert_eq!("a1", fs::read_to_string(destination.join("a.txt"))?);
        assert_eq!("body {}", fs::read_to_string(destination.join("css/site.css"))?);
        assert_eq!("* {}", fs::read_to_string(destination.join("css/vendor/reset.css"))?);
        assert!(!destination.join("x.txt").exists());
        assert!(!destination.join("readme.md").exists());
        assert!(destination.join(".deploy_app").exists());

        assert_eq!(
            vec![
                "src r1 repo_root",
                "raw r1 repo_root/a.txt",
                "raw r1 repo_root/b.txt",
                "raw r1 repo_root/index.html",
                "src r1 repo_root/css",
                "raw r1 repo_root/css/site.css",
                "src r1 repo_root/css/vendor",
                "raw r1 repo_root/css/vendor/reset.css",
            ],
            source.requests()
        );

        Ok(())
    }

    #[test]
    fn it_should_deploy_incrementally_once_initialized() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source();
        let mapping = mapping();
        let destination = initialize(&dir, &source, &mapping)?;
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let report = engine.deploy("main", &commit("r2", &[("repo_root/a.txt", ChangeKind::Modified)]))?;

        assert_eq!(Strategy::Incremental, report.strategy);
        assert!(!report.marked);
        assert_eq!(1, report.written());
        assert_eq!("a2", fs::read_to_string(destination.join("a.txt"))?);
        assert_eq!("b1", fs::read_to_string(destination.join("b.txt"))?);
        assert_eq!(vec!["raw r2 repo_root/a.txt"], source.requests());

        Ok(())
    }

    #[test]
    fn it_should_remove_files() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source();
        let mapping = mapping();
        let destination = initialize(&dir, &source, &mapping)?;
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let removal = commit("r2", &[("repo_root/b.txt", ChangeKind::Removed)]);
        let report = engine.deploy("main", &removal)?;
        assert!(matches!(report.outcomes[0], FileOutcome::Removed { .. }));
        assert!(!destination.join("b.txt").exists());

        // Removing it again is not an error
        let report = engine.deploy("main", &removal)?;
        assert!(matches!(report.outcomes[0], FileOutcome::AlreadyAbsent { .. }));
        assert_eq!(1, report.removed());
        assert!(source.requests().is_empty());

        Ok(())
    }

    #[test]
    fn it_should_skip_files_outside_the_repository_root() -> Result<(), Box<dyn Error>> {
        testing_logger::setup();
        let dir = tempdir()?;
        let destination = dir.path().join("main");
        fs::create_dir(&destination)?;
        state::mark_complete(&destination, "app")?;

        let mut source = MockRemoteSource::new();
        source.expect_list_tree().times(0);
        source.expect_fetch_file().times(0);
        let mapping = mapping();
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let report = engine.deploy(
            "main",
            &commit(
                "r2",
                &[
                    ("docs/readme.md", ChangeKind::Modified),
                    ("docs/old.md", ChangeKind::Removed),
                ],
            ),
        )?;

        assert_eq!(2, report.skipped());
        assert!(!destination.join("readme.md").exists());
        assert!(!dir.path().join("docs").exists());
        testing_logger::validate(|logs| {
            assert!(logs.iter().any(|log| log.level == Level::Debug
                && log.body == "Skipping docs/readme.md, it is outside of the repository root."));
        });

        Ok(())
    }

    #[test]
    fn it_should_be_idempotent() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source();
        let mapping = mapping();
        let destination = initialize(&dir, &source, &mapping)?;
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let change = commit(
            "r2",
            &[
                ("repo_root/a.txt", ChangeKind::Modified),
                ("repo_root/c.txt", ChangeKind::Added),
                ("repo_root/b.txt", ChangeKind::Removed),
            ],
        );

        engine.deploy("main", &change)?;
        let first = (
            fs::read_to_string(destination.join("a.txt"))?,
            fs::read_to_string(destination.join("c.txt"))?,
            destination.join("b.txt").exists(),
        );
        engine.deploy("main", &change)?;
        let second = (
            fs::read_to_string(destination.join("a.txt"))?,
            fs::read_to_string(destination.join("c.txt"))?,
            destination.join("b.txt").exists(),
        );

        assert_eq!((String::from("a2"), String::from("c2"), false), first);
        assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn it_should_apply_changes_in_order() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source();
        let mapping = mapping();
        let destination = initialize(&dir, &source, &mapping)?;
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        engine.deploy(
            "main",
            &commit(
                "r2",
                &[
                    ("repo_root/c.txt", ChangeKind::Added),
                    ("repo_root/c.txt", ChangeKind::Removed),
                ],
            ),
        )?;

        assert!(!destination.join("c.txt").exists());

        Ok(())
    }

    #[test]
    fn it_should_continue_after_a_failed_download() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source().failing("repo_root/a.txt");
        let mapping = mapping();
        let destination = dir.path().join("main");
        fs::create_dir(&destination)?;
        fs::write(destination.join("a.txt"), "stale")?;
        state::mark_complete(&destination, "app")?;
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let report = engine.deploy(
            "main",
            &commit(
                "r2",
                &[
                    ("repo_root/a.txt", ChangeKind::Modified),
                    ("repo_root/c.txt", ChangeKind::Added),
                ],
            ),
        )?;

        assert_eq!(1, report.failed());
        assert_eq!(1, report.written());
        assert!(matches!(
            &report.outcomes[0],
            FileOutcome::Failed { path, error: RemoteError::Status(_, 500) } if path == "repo_root/a.txt"
        ));
        assert_eq!("stale", fs::read_to_string(destination.join("a.txt"))?);
        assert!(!destination.join("a.txt.deploy-tmp").exists());
        assert_eq!("c2", fs::read_to_string(destination.join("c.txt"))?);

        Ok(())
    }

    #[test]
    fn it_should_not_mark_an_incomplete_full_sync() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source().failing("repo_root/css");
        let mapping = mapping();
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let report = engine.deploy("main", &commit("r1", &[]))?;

        let destination = dir.path().join("main");
        assert_eq!(Strategy::Full, report.strategy);
        assert!(!report.marked);
        assert_eq!(1, report.failed());
        assert_eq!(3, report.written());
        assert!(state::is_initial_deploy(&destination, "app"));

        // The next delivery starts from scratch again
        let report = engine.deploy("main", &commit("r1", &[]))?;
        assert_eq!(Strategy::Full, report.strategy);

        Ok(())
    }

    #[test]
    fn it_should_fail_on_too_deep_trees() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let deep = format!("repo_root/{}file.txt", "d/".repeat(MAX_TREE_DEPTH + 1));
        let source = TestSource::new().with_file("r1", &deep, "deep");
        let mapping = mapping();
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let result = engine.deploy("main", &commit("r1", &[]));

        assert!(
            matches!(result, Err(SyncError::TreeTooDeep(_))),
            "{result:?} should be TreeTooDeep"
        );
        assert!(state::is_initial_deploy(&dir.path().join("main"), "app"));

        Ok(())
    }

    #[test]
    fn it_should_abort_the_commit_if_the_destination_is_not_writable() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source().with_file("r2", "repo_root/sub/d.txt", "d2");
        let mapping = mapping();
        let destination = initialize(&dir, &source, &mapping)?;
        // A file in place of the directory makes writing below it impossible
        fs::write(destination.join("sub"), "in the way")?;
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let result = engine.deploy(
            "main",
            &commit(
                "r2",
                &[
                    ("repo_root/sub/d.txt", ChangeKind::Added),
                    ("repo_root/c.txt", ChangeKind::Added),
                ],
            ),
        );

        assert!(
            matches!(result, Err(SyncError::Path(PathError::CreateDirectory(_, _)))),
            "{result:?} should be CreateDirectory"
        );
        assert!(!destination.join("c.txt").exists());
        assert!(source.requests().is_empty());

        Ok(())
    }

    #[test]
    fn it_should_use_the_branch_mapping() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source();
        let mut mapping = mapping();
        mapping
            .branch_to_dir
            .insert(String::from("main"), String::from("production"));
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let report = engine.deploy("main", &commit("r1", &[]))?;

        assert_eq!(dir.path().join("production"), report.destination);
        assert!(dir.path().join("production/.deploy_app").exists());
        assert!(!dir.path().join("main").exists());

        Ok(())
    }

    #[test]
    fn it_should_not_touch_the_deploy_state() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = source()
            .with_file("r2", "repo_root/.deploy.lock", "unlocked")
            .with_file("r2", "repo_root/a.txt.deploy-tmp", "half")
            .with_file("r2", "repo_root/css/.deploy_app", "nested");
        let mapping = mapping();
        let destination = initialize(&dir, &source, &mapping)?;
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let report = engine.deploy(
            "main",
            &commit(
                "r2",
                &[
                    ("repo_root/.deploy_app", ChangeKind::Removed),
                    ("repo_root/.deploy_api", ChangeKind::Modified),
                    ("repo_root/.deploy.lock", ChangeKind::Modified),
                    ("repo_root/a.txt.deploy-tmp", ChangeKind::Added),
                    ("repo_root/css/.deploy_app", ChangeKind::Added),
                ],
            ),
        )?;

        assert_eq!(4, report.skipped());
        assert_eq!(1, report.written());
        assert!(!state::is_initial_deploy(&destination, "app"));
        assert_eq!(0, fs::metadata(destination.join(".deploy.lock"))?.len());
        assert!(!destination.join(".deploy_api").exists());
        assert!(!destination.join("a.txt.deploy-tmp").exists());
        // Only the root of the destination holds the deploy state
        assert_eq!("nested", fs::read_to_string(destination.join("css/.deploy_app"))?);
        assert_eq!(vec!["raw r2 repo_root/css/.deploy_app"], source.requests());

        Ok(())
    }

    #[test]
    fn it_should_not_deploy_a_marker_from_the_repository() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let source = TestSource::new()
            .with_file("r1", "repo_root/index.html", "hello")
            .with_file("r1", "repo_root/.deploy_app", "from the repository");
        let mapping = mapping();
        let engine = SyncEngine::new(&source, "app", &mapping, dir.path());

        let report = engine.deploy("main", &commit("r1", &[]))?;

        let destination = dir.path().join("main");
        assert!(report.marked);
        assert_eq!(1, report.written());
        assert_eq!(1, report.skipped());
        assert_eq!(0, fs::metadata(destination.join(".deploy_app"))?.len());

        Ok(())
    }

    #[test]
    fn it_should_refuse_destinations_outside_the_base_directory() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let base = dir.path().join("www");
        let source = source();
        let mapping = mapping();
        let engine = SyncEngine::new(&source, "app", &mapping, &base);

        let result = engine.deploy("../escaped", &commit("r1", &[]));

        assert!(
            matches!(result, Err(SyncError::Path(PathError::InvalidDestination(_, _)))),
            "{result:?} should be InvalidDestination"
        );
        assert!(!dir.path().join("escaped").exists());
        assert!(source.requests().is_empty());

        Ok(())
    }

    #[test]
    fn it_should_join_paths() {
        assert_eq!("", join_path("", ""));
        assert_eq!("css", join_path("", "css"));
        assert_eq!("repo_root", join_path("/repo_root/", ""));
        assert_eq!("repo_root/css", join_path("repo_root", "css"));
    }
}
