use super::{Delivery, Trigger, TriggerError};
use log::{debug, info, warn};
use std::sync::mpsc::Sender;

/// A trigger that stops the deploys when the process is asked to terminate.
///
/// The stop is queued behind the notifications that already arrived, so they
/// are still deployed. Signalling again exits without waiting.
#[derive(Default)]
pub struct SignalTrigger;

impl SignalTrigger {
    pub fn new() -> Self {
        SignalTrigger
    }

    /// Queue the stop on the first signal. Returns the exit code if another one arrives.
    fn watch<I>(&self, tx: &Sender<Option<Delivery>>, signals: I) -> Option<i32>
    where
        I: IntoIterator<Item = i32>,
    {
        for (received, signal) in signals.into_iter().enumerate() {
            if received > 0 {
                warn!("Got signal {signal} again, exiting without waiting for the deploy.");
                return Some(128 + signal);
            }

            info!("Got signal {signal}, stopping after the pending deploys.");
            if tx.send(None).is_err() {
                debug!("The deploys have already stopped.");
            }
        }

        None
    }
}

impl Trigger for SignalTrigger {
    #[cfg(unix)]
    fn listen(&self, tx: Sender<Option<Delivery>>) -> Result<(), TriggerError> {
        use signal_hook::{consts::TERM_SIGNALS, iterator::Signals};

        let mut signals = Signals::new(TERM_SIGNALS).map_err(|err| {
            TriggerError::FailedTrigger(format!("cannot set up signal handler: {err}"))
        })?;

        if let Some(code) = self.watch(&tx, signals.forever()) {
            log::logger().flush();
            std::process::exit(code);
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn listen(&self, _tx: Sender<Option<Delivery>>) -> Result<(), TriggerError> {
        debug!("Signal handlers are not supported on non-unix systems.");

        Ok(())
    }
}
