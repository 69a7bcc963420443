//! Application orchestration layer: solve lifecycle and result projections.

mod controller;
pub mod dispatch;
pub mod image;
mod session;
pub mod view;

pub use controller::{
    Applied, ModePhase, Outcome, Payload, ResultState, Settlement, SolveController,
    SubmitRejected, Submission,
};
pub use dispatch::Dispatcher;
pub use image::{ImageSelection, load_image};
pub use session::Session;
pub use solver_client::SolveService;
pub use view::{Badge, ConfidenceBar, ResultView, StepSection, StepsView};
