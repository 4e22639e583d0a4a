use crate::payload::Repository;
use mockall::automock;
use std::io::Read;
use thiserror::Error;

/// A remote source using the Bitbucket 1.0 REST API.
pub mod bitbucket;

/// A custom error for describing the error cases of reading from the hosting API.
///
/// These are only fatal to the file (or directory) that was being read.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request couldn't be sent or the response couldn't be read (DNS, TLS, timeout, etc.).
    #[error("request to {0} failed: {1}")]
    Request(String, String),
    /// The credentials were rejected.
    #[error("not authorized to read {0}, check the credentials")]
    Unauthorized(String),
    /// The API answered with an unexpected status code.
    #[error("{0} returned status {1}")]
    Status(String, u16),
    /// The directory listing is not in the expected format.
    #[error("cannot decode listing of {0}: {1}")]
    InvalidListing(String, String),
    /// The file contents broke off while streaming them.
    #[error("cannot read contents of {0}: {1}")]
    Read(String, #[source] std::io::Error),
}

/// The immediate children of one directory at one revision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeListing {
    /// Repository-relative paths of the files in the directory.
    pub files: Vec<String>,
    /// Names of the subdirectories.
    pub directories: Vec<String>,
}

/// Read access to the revisions of one repository.
#[automock]
pub trait RemoteSource {
    /// List the files and directories directly under the repository-relative directory.
    fn list_tree(&self, revision: &str, directory: &str) -> Result<TreeListing, RemoteError>;
    /// Open the raw contents of a file, to be streamed to disk.
    fn fetch_file(&self, revision: &str, path: &str) -> Result<Box<dyn Read + Send>, RemoteError>;
}

/// Creates the remote source for the repository named in a notification.
#[automock]
pub trait Connector {
    fn connect(&self, repository: &Repository) -> Box<dyn RemoteSource>;
}
