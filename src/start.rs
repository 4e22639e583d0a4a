use crate::{
    deploy::Deployer,
    triggers::{Delivery, Trigger},
};
use log::{debug, error, info};
use std::{sync::mpsc, thread};
use thiserror::Error;

/// A custom error implementation for the start function
#[derive(Debug, Error)]
pub enum StartError {
    #[error("You have to define at least one trigger (--http or --payload).")]
    NoTriggers,
}

/// The main program loop, that runs the triggers and deploys every delivery in order.
///
/// Deliveries are deployed one by one on the calling thread, so two deploys never overlap.
/// It returns when a trigger asks to stop, or every trigger exited.
pub fn start(triggers: Vec<Box<dyn Trigger>>, deployer: &dyn Deployer) -> Result<(), StartError> {
    let (tx, rx) = mpsc::channel::<Option<Delivery>>();

    if triggers.is_empty() {
        return Err(StartError::NoTriggers);
    }

    for trigger in triggers {
        let tx = tx.clone();
        thread::spawn(move || {
            let result = trigger.listen(tx);
            if let Err(err) = result {
                error!("Trigger failed: {err}.");
            }
        });
    }
    drop(tx);

    debug!("Waiting on triggers.");
    while let Ok(Some(delivery)) = rx.recv() {
        let report = deployer.deploy(&delivery);
        if report.aborted > 0 {
            error!(
                "{} commits were aborted, they will be retried on the next notification.",
                report.aborted
            );
        }
    }

    info!("Finished running.");

    Ok(())
}
