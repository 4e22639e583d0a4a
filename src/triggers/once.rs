use super::{Delivery, Trigger, TriggerError};
use crate::payload::extract_form_field;
use log::debug;
use std::{
    fs,
    io::{self, Read},
    sync::mpsc::Sender,
};

const TRIGGER_NAME: &str = "ONCE";

/// A trigger that deploys a payload from a file once and then exits.
///
/// Useful to replay a notification by hand. The file can contain the JSON payload,
/// or the whole form-encoded request body. Pass `-` to read from the standard input.
pub struct OnceTrigger {
    path: String,
}

impl OnceTrigger {
    pub fn new(path: String) -> Self {
        Self { path }
    }

    fn read_payload(&self) -> Result<String, TriggerError> {
        let contents = if self.path == "-" {
            let mut contents = String::new();
            io::stdin()
                .read_to_string(&mut contents)
                .map_err(|err| TriggerError::FailedTrigger(format!("cannot read stdin: {err}")))?;
            contents
        } else {
            fs::read_to_string(&self.path).map_err(|err| {
                TriggerError::Misconfigured(format!("cannot read {}: {err}", self.path))
            })?
        };

        if contents.trim_start().starts_with('{') {
            Ok(contents)
        } else {
            Ok(extract_form_field(contents.trim(), "payload").unwrap_or(contents))
        }
    }
}

impl Trigger for OnceTrigger {
    /// Delivers the payload and asks the deploys to stop.
    fn listen(&self, tx: Sender<Option<Delivery>>) -> Result<(), TriggerError> {
        let payload = self.read_payload()?;
        debug!("Read {} bytes from {}.", payload.len(), self.path);

        tx.send(Some(Delivery {
            trigger: TRIGGER_NAME,
            payload: Some(payload),
        }))?;
        tx.send(None)?;

        Ok(())
    }
}
