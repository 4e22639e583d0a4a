use crate::{
    config::Config,
    payload::{self, Payload},
    remote::Connector,
    sync::{CommitReport, SyncEngine},
    triggers::Delivery,
};
use log::{debug, error, info, warn};
use mockall::automock;
use std::path::PathBuf;

/// Everything that happened during one notification.
#[derive(Debug, Default)]
pub struct DeployReport {
    /// The repository of the notification, if it could be parsed.
    pub repository: Option<String>,
    /// The commits that were applied, in order.
    pub commits: Vec<CommitReport>,
    /// Commits that were aborted by a filesystem error.
    pub aborted: usize,
    /// Commits that were ignored, because they don't belong to a branch or
    /// their branch can't be deployed under the base directory.
    pub ignored: usize,
}

/// Something that can deploy the notifications coming from the triggers.
#[automock]
pub trait Deployer {
    /// Deploy a notification. Failures are logged and reported, never returned.
    fn deploy(&self, delivery: &Delivery) -> DeployReport;
}

/// Logs the start and the end of a deploy and flushes the log, on every way out.
struct DeploySession;

impl DeploySession {
    fn start() -> Self {
        info!("************ Deploy in progress. ************");
        DeploySession
    }
}

impl Drop for DeploySession {
    fn drop(&mut self) {
        info!("************ Deploy finished. ************");
        log::logger().flush();
    }
}

/// Deploys one notification at a time: parses it and syncs every commit in it.
pub struct DeployCoordinator {
    config: Config,
    base_dir: PathBuf,
    connector: Box<dyn Connector>,
}

impl DeployCoordinator {
    /// Create a coordinator deploying the branches into directories under `base_dir`.
    pub fn new(config: Config, base_dir: PathBuf, connector: Box<dyn Connector>) -> Self {
        DeployCoordinator {
            config,
            base_dir,
            connector,
        }
    }

    /// Parse the body of the notification and deploy every commit in it.
    pub fn deploy_payload(&self, body: Option<&str>) -> DeployReport {
        let _session = DeploySession::start();

        match payload::parse(body) {
            Ok(payload) => self.deploy_commits(&payload),
            Err(err) => {
                warn!("Nothing to deploy: {err}.");
                DeployReport::default()
            }
        }
    }

    fn deploy_commits(&self, payload: &Payload) -> DeployReport {
        debug!("Payload: {payload:#?}");
        let repository = &payload.repository;
        let mapping = self.config.mapping_for(&repository.name);
        debug!(
            "Deploying {} with repository root {:?} and branches {:?}.",
            repository.name, mapping.repository_root, mapping.branch_to_dir
        );

        let source = self.connector.connect(repository);
        let engine = SyncEngine::new(
            source.as_ref(),
            &repository.name,
            &mapping,
            &self.base_dir,
        );

        let mut report = DeployReport {
            repository: Some(repository.name.clone()),
            ..DeployReport::default()
        };
        for commit in &payload.commits {
            let Some(branch) = commit.branch.as_deref() else {
                warn!("Commit {} is not on a branch, ignoring.", commit.revision);
                report.ignored += 1;
                continue;
            };

            let destination = match engine.destination(branch) {
                Ok(destination) => destination,
                Err(err) => {
                    warn!("Commit {} cannot be deployed: {err}, ignoring.", commit.revision);
                    report.ignored += 1;
                    continue;
                }
            };

            match engine.deploy(branch, commit) {
                Ok(commit_report) => report.commits.push(commit_report),
                Err(err) => {
                    error!(
                        "Deploying commit {} to {} failed: {err}.",
                        commit.revision,
                        destination.display()
                    );
                    report.aborted += 1;
                }
            }
        }

        info!(
            "Deployed {} of {} commits of {}.",
            report.commits.len(),
            payload.commits.len(),
            repository.name
        );

        report
    }
}

impl Deployer for DeployCoordinator {
    fn deploy(&self, delivery: &Delivery) -> DeployReport {
        debug!("Deploying notification from {}.", delivery.trigger);
        self.deploy_payload(delivery.payload.as_deref())
    }
}
