use super::{Delivery, Trigger, TriggerError};
use crate::payload::extract_form_field;
use log::{debug, info, warn};
use std::sync::mpsc::Sender;
use tiny_http::{Request, Response, Server};

const TRIGGER_NAME: &str = "HTTP";

/// The form field the hosting service puts the notification in.
const PAYLOAD_FIELD: &str = "payload";

/// A trigger that receives webhooks over HTTP.
///
/// Configure the hosting service to POST its push notifications to this server.
/// The notification can be a form with a `payload` field (the Bitbucket POST service)
/// or a JSON body with `Content-Type: application/json`.
pub struct HttpTrigger {
    http: String,
}

impl HttpTrigger {
    /// Create an new HTTP trigger with a HTTP url. It accepts an address as a string,
    /// for example "0.0.0.0:1234".
    pub fn new(http: String) -> Self {
        Self { http }
    }

    fn read_payload(request: &mut Request) -> Option<String> {
        let mut body = String::new();
        if let Err(err) = request.as_reader().read_to_string(&mut body) {
            warn!("Cannot read request body: {err}.");
            return None;
        }

        let is_json = request.headers().iter().any(|header| {
            header.field.equiv("Content-Type")
                && header.value.as_str().starts_with("application/json")
        });

        if is_json {
            Some(body)
        } else {
            extract_form_field(&body, PAYLOAD_FIELD)
        }
    }
}

impl Trigger for HttpTrigger {
    /// Starts a minimal HTTP 1.1 server, that delivers the body of every request.
    ///
    /// Every method and every URL returns 200 status code with plaintext "OK".
    /// The delivery is queued before responding, so the deploy may already be
    /// running (or even finished) when the response is sent.
    fn listen(&self, tx: Sender<Option<Delivery>>) -> Result<(), TriggerError> {
        let listener = Server::http(&self.http).map_err(|_| {
            TriggerError::Misconfigured(format!("cannot start server on {}", self.http))
        })?;
        info!("Listening on {}...", self.http);

        for mut request in listener.incoming_requests() {
            debug!("Received request on {} {}.", request.method(), request.url());

            let payload = Self::read_payload(&mut request);
            tx.send(Some(Delivery {
                trigger: TRIGGER_NAME,
                payload,
            }))?;

            if let Err(err) = request.respond(Response::from_string("OK")) {
                warn!("Cannot respond to the request: {err}.");
            }
        }

        Ok(())
    }
}
