//! Sends accepted submissions on the runtime and reports settlements back.

use std::sync::Arc;

use solver_client::SolveService;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{Outcome, Payload, Settlement, Submission};

pub struct Dispatcher {
    service: Arc<dyn SolveService>,
    runtime: Handle,
    tx: UnboundedSender<Settlement>,
}

impl Dispatcher {
    pub fn new(
        service: Arc<dyn SolveService>,
        runtime: Handle,
    ) -> (Self, UnboundedReceiver<Settlement>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                service,
                runtime,
                tx,
            },
            rx,
        )
    }

    /// Later submissions go to `service`; in-flight ones finish on the old one.
    pub fn set_service(&mut self, service: Arc<dyn SolveService>) {
        self.service = service;
    }

    pub fn dispatch(&self, submission: Submission) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let settlement = execute(service.as_ref(), submission).await;
            if tx.send(settlement).is_err() {
                debug!("view is gone, dropping settlement");
            }
        })
    }
}

/// Runs one submission to settlement. Never retries.
pub async fn execute(service: &dyn SolveService, submission: Submission) -> Settlement {
    let token = submission.token;
    let outcome = match &submission.payload {
        Payload::Text(request) => Outcome::Text(service.solve_text(request).await),
        Payload::Image(image) => Outcome::Image(service.solve_image(image).await),
    };
    Settlement { token, outcome }
}
