//! Everything one client run owns, shared by the TUI and headless mode.

use std::sync::Arc;

use solver_client::SolveService;
use solver_core::{ImageInput, Settings};
use solver_engine::MarkdownEngine;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{Applied, Dispatcher, ResultView, Settlement, SolveController, StepsView, SubmitRejected};

pub struct Session {
    pub settings: Settings,
    pub controller: SolveController,
    engine: MarkdownEngine,
    dispatcher: Dispatcher,
    settlements: UnboundedReceiver<Settlement>,
    steps: Option<StepsView>,
}

impl Session {
    pub fn new(
        mut settings: Settings,
        dispatcher: Dispatcher,
        settlements: UnboundedReceiver<Settlement>,
    ) -> Self {
        settings.normalize();
        Self {
            controller: SolveController::new(settings.settlement_policy),
            settings,
            engine: MarkdownEngine::new(),
            dispatcher,
            settlements,
            steps: None,
        }
    }

    pub fn submit_text(&mut self, question: &str) -> Result<JoinHandle<()>, SubmitRejected> {
        let submission =
            self.controller
                .submit_text(question, self.settings.level, &self.settings.locale)?;
        Ok(self.dispatcher.dispatch(submission))
    }

    pub fn submit_image(
        &mut self,
        image: Option<&ImageInput>,
    ) -> Result<JoinHandle<()>, SubmitRejected> {
        let submission = self.controller.submit_image(image)?;
        Ok(self.dispatcher.dispatch(submission))
    }

    /// Applies every settlement that has arrived, without blocking.
    pub fn poll(&mut self) -> Vec<Applied> {
        let mut applied = Vec::new();
        loop {
            match self.settlements.try_recv() {
                Ok(settlement) => {
                    let outcome = self.controller.settle(settlement);
                    if matches!(outcome, Applied::Result(_)) {
                        self.steps = StepsView::from_state(self.controller.result(), &self.engine);
                    }
                    applied.push(outcome);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("settlement channel closed");
                    break;
                }
            }
        }
        applied
    }

    pub fn result_view(&self) -> Option<ResultView> {
        ResultView::from_state(self.controller.result())
    }

    pub fn steps(&self) -> Option<&StepsView> {
        self.steps.as_ref()
    }

    pub fn steps_mut(&mut self) -> Option<&mut StepsView> {
        self.steps.as_mut()
    }

    /// Re-reads the policy from settings after they were edited.
    pub fn sync_settings(&mut self) {
        self.settings.normalize();
        self.controller.set_policy(self.settings.settlement_policy);
    }

    pub fn set_service(&mut self, service: Arc<dyn SolveService>) {
        self.dispatcher.set_service(service);
    }
}
