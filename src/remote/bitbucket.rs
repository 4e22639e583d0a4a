use super::{Connector, RemoteError, RemoteSource, TreeListing};
use crate::{config::Config, payload::Repository};
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, trace};
use serde::Deserialize;
use std::io::Read;
use ureq::{Agent, AgentBuilder};

/// Listing returned by the `src` endpoint.
#[derive(Debug, Deserialize)]
struct SrcResponse {
    #[serde(default)]
    directories: Vec<String>,
    #[serde(default)]
    files: Vec<SrcFile>,
}

#[derive(Debug, Deserialize)]
struct SrcFile {
    path: String,
}

/// Creates [BitbucketSource]s sharing one HTTP agent and the configured credentials.
pub struct BitbucketConnector {
    agent: Agent,
    api_url: String,
    authorization: Option<String>,
}

impl BitbucketConnector {
    pub fn new(config: &Config) -> Self {
        let agent = AgentBuilder::new().timeout(config.timeout()).build();
        let authorization = if config.user.is_empty() {
            None
        } else {
            let credentials = format!("{}:{}", config.user, config.pass);
            Some(format!("Basic {}", STANDARD.encode(credentials)))
        };

        BitbucketConnector {
            agent,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            authorization,
        }
    }
}

impl Connector for BitbucketConnector {
    fn connect(&self, repository: &Repository) -> Box<dyn RemoteSource> {
        let base = format!(
            "{}/{}",
            self.api_url,
            repository.absolute_url.trim_matches('/')
        );
        debug!("Reading repository {} from {base}.", repository.name);

        Box::new(BitbucketSource {
            agent: self.agent.clone(),
            base,
            authorization: self.authorization.clone(),
        })
    }
}

/// Reads directory listings and raw files of one repository with authenticated GET requests.
pub struct BitbucketSource {
    agent: Agent,
    base: String,
    authorization: Option<String>,
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl BitbucketSource {
    fn url(&self, endpoint: &str, revision: &str, path: &str) -> String {
        format!(
            "{}/{endpoint}/{}/{}",
            self.base,
            urlencoding::encode(revision),
            encode_path(path)
        )
    }

    fn get(&self, url: &str) -> Result<ureq::Response, RemoteError> {
        trace!("GET {url}");
        let mut request = self.agent.get(url);
        if let Some(authorization) = &self.authorization {
            request = request.set("Authorization", authorization);
        }

        match request.call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(401 | 403, _)) => {
                Err(RemoteError::Unauthorized(String::from(url)))
            }
            Err(ureq::Error::Status(code, _)) => Err(RemoteError::Status(String::from(url), code)),
            Err(ureq::Error::Transport(transport)) => Err(RemoteError::Request(
                String::from(url),
                transport.to_string(),
            )),
        }
    }
}

impl RemoteSource for BitbucketSource {
    fn list_tree(&self, revision: &str, directory: &str) -> Result<TreeListing, RemoteError> {
        let mut url = self.url("src", revision, directory);
        if !url.ends_with('/') {
            url.push('/');
        }

        let response = self.get(&url)?;
        let listing: SrcResponse = response
            .into_json()
            .map_err(|err| RemoteError::InvalidListing(url.clone(), err.to_string()))?;

        Ok(TreeListing {
            files: listing.files.into_iter().map(|file| file.path).collect(),
            directories: listing.directories,
        })
    }

    fn fetch_file(&self, revision: &str, path: &str) -> Result<Box<dyn Read + Send>, RemoteError> {
        let url = self.url("raw", revision, path);
        let response = self.get(&url)?;

        let reader: Box<dyn Read + Send> = Box::new(response.into_reader());
        Ok(reader)
    }
}
