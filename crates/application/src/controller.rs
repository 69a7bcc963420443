use solver_client::{IMAGE_FALLBACK, SolveResult, TEXT_FALLBACK, error_message};
use solver_core::{
    ImageInput, ImageSolveResponse, Level, Mode, SettlementPolicy, SolveRequest, SolveResponse,
    ValidationError,
};
use tracing::{debug, info};

/// What the result pane shows. At most one mode's result at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResultState {
    #[default]
    None,
    Text(SolveResponse),
    Image(ImageSolveResponse),
}

impl ResultState {
    pub fn mode(&self) -> Option<Mode> {
        match self {
            ResultState::None => None,
            ResultState::Text(_) => Some(Mode::Text),
            ResultState::Image(_) => Some(Mode::Image),
        }
    }

    pub fn text(&self) -> Option<&SolveResponse> {
        match self {
            ResultState::Text(response) => Some(response),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<&ImageSolveResponse> {
        match self {
            ResultState::Image(response) => Some(response),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModePhase {
    #[default]
    Idle,
    Submitting {
        token: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitRejected {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("a {0} solve is already in flight")]
    Busy(Mode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(SolveRequest),
    Image(ImageInput),
}

/// An accepted submission, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub token: u64,
    pub payload: Payload,
}

impl Submission {
    pub fn mode(&self) -> Mode {
        match self.payload {
            Payload::Text(_) => Mode::Text,
            Payload::Image(_) => Mode::Image,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Text(SolveResult<SolveResponse>),
    Image(SolveResult<ImageSolveResponse>),
}

#[derive(Debug)]
pub struct Settlement {
    pub token: u64,
    pub outcome: Outcome,
}

impl Settlement {
    pub fn mode(&self) -> Mode {
        match self.outcome {
            Outcome::Text(_) => Mode::Text,
            Outcome::Image(_) => Mode::Image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Result(Mode),
    Error(Mode),
    Discarded(Mode),
}

#[derive(Debug, Clone)]
pub struct SolveController {
    policy: SettlementPolicy,
    result: ResultState,
    error: Option<String>,
    text: ModePhase,
    image: ModePhase,
    next_token: u64,
    last_applied: u64,
}

impl Default for SolveController {
    fn default() -> Self {
        Self::new(SettlementPolicy::default())
    }
}

impl SolveController {
    pub fn new(policy: SettlementPolicy) -> Self {
        Self {
            policy,
            result: ResultState::None,
            error: None,
            text: ModePhase::Idle,
            image: ModePhase::Idle,
            next_token: 1,
            last_applied: 0,
        }
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SettlementPolicy) {
        self.policy = policy;
    }

    pub fn result(&self) -> &ResultState {
        &self.result
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn phase(&self, mode: Mode) -> ModePhase {
        match mode {
            Mode::Text => self.text,
            Mode::Image => self.image,
        }
    }

    pub fn is_submitting(&self, mode: Mode) -> bool {
        matches!(self.phase(mode), ModePhase::Submitting { .. })
    }

    pub fn submit_text(
        &mut self,
        question: &str,
        level: Level,
        locale: &str,
    ) -> Result<Submission, SubmitRejected> {
        self.begin(Mode::Text)?;
        let request = SolveRequest::new(question, level, locale).map_err(|err| self.reject(err))?;
        Ok(self.accept(Payload::Text(request)))
    }

    pub fn submit_image(&mut self, file: Option<&ImageInput>) -> Result<Submission, SubmitRejected> {
        self.begin(Mode::Image)?;
        let Some(file) = file else {
            return Err(self.reject(ValidationError::NoImageSelected));
        };
        Ok(self.accept(Payload::Image(file.clone())))
    }

    pub fn settle(&mut self, settlement: Settlement) -> Applied {
        let mode = settlement.mode();
        let token = settlement.token;

        let phase = self.phase_mut(mode);
        if *phase == (ModePhase::Submitting { token }) {
            *phase = ModePhase::Idle;
        }

        if self.policy == SettlementPolicy::LatestIssued && token < self.last_applied {
            debug!(%mode, token, last_applied = self.last_applied, "discarding stale settlement");
            return Applied::Discarded(mode);
        }
        self.last_applied = self.last_applied.max(token);

        match settlement.outcome {
            Outcome::Text(Ok(response)) => {
                info!(token, verified = response.verified, "text solve settled");
                self.result = ResultState::Text(response);
                Applied::Result(mode)
            }
            Outcome::Image(Ok(response)) => {
                info!(token, verified = response.result.verified, "image solve settled");
                self.result = ResultState::Image(response);
                Applied::Result(mode)
            }
            Outcome::Text(Err(err)) => {
                self.error = Some(error_message(&err, TEXT_FALLBACK));
                Applied::Error(mode)
            }
            Outcome::Image(Err(err)) => {
                self.error = Some(error_message(&err, IMAGE_FALLBACK));
                Applied::Error(mode)
            }
        }
    }

    fn begin(&mut self, mode: Mode) -> Result<(), SubmitRejected> {
        if self.is_submitting(mode) {
            return Err(SubmitRejected::Busy(mode));
        }
        self.error = None;
        Ok(())
    }

    fn reject(&mut self, err: ValidationError) -> SubmitRejected {
        self.error = Some(err.to_string());
        SubmitRejected::Invalid(err)
    }

    fn accept(&mut self, payload: Payload) -> Submission {
        let token = self.next_token;
        self.next_token += 1;
        let submission = Submission { token, payload };
        let mode = submission.mode();
        *self.phase_mut(mode) = ModePhase::Submitting { token };
        debug!(%mode, token, "submission accepted");
        submission
    }

    fn phase_mut(&mut self, mode: Mode) -> &mut ModePhase {
        match mode {
            Mode::Text => &mut self.text,
            Mode::Image => &mut self.image,
        }
    }
}
