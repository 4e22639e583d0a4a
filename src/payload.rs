use serde::Deserialize;
use thiserror::Error;

/// A custom error for describing why a notification body cannot be deployed.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The notification did not carry a payload at all.
    #[error("there is no payload in the notification")]
    Missing,
    /// The payload field was there, but contained only whitespace.
    #[error("the payload is empty")]
    Empty,
    /// The payload is not well-formed JSON, or doesn't have the expected shape.
    #[error("the payload is invalid: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// The decoded push notification.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Payload {
    pub repository: Repository,
    #[serde(default)]
    pub commits: Vec<Commit>,
}

/// The repository the push happened in.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    /// Path of the repository on the hosting API, e.g. `/owner/app/`.
    pub absolute_url: String,
}

/// One pushed commit, in the order the hosting service sent it.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Commit {
    /// The branch the commit landed on. Merge commits may arrive without one.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(rename = "node")]
    pub revision: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

/// A single file touched by a commit.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FileChange {
    #[serde(rename = "file")]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

/// What happened to a file in a commit.
///
/// Only removals are special: every other change type (including ones we
/// don't know about) means the file has to be downloaded again.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(from = "String")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl From<String> for ChangeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "added" => ChangeKind::Added,
            "removed" => ChangeKind::Removed,
            _ => ChangeKind::Modified,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Removed => write!(f, "removed"),
        }
    }
}

/// Decode the notification body into a [Payload].
pub fn parse(body: Option<&str>) -> Result<Payload, PayloadError> {
    let body = body.ok_or(PayloadError::Missing)?.trim();
    if body.is_empty() {
        return Err(PayloadError::Empty);
    }

    let payload = serde_json::from_str(body)?;
    Ok(payload)
}

/// Find a field in an `application/x-www-form-urlencoded` body and decode its value.
pub fn extract_form_field(body: &str, name: &str) -> Option<String> {
    body.split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| {
            let value = value.replace('+', " ");
            urlencoding::decode(&value).ok().map(|v| v.into_owned())
        })
}
