//! Test helpers and fixtures.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use solver_application::{Dispatcher, Session, SolveService};
use solver_client::{SolveError, SolveResult};
use solver_core::{
    HealthStatus, ImageInput, ImageSolveResponse, ModelInfo, SolveRequest, SolveResponse, Settings,
    Step, ValidationError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const SCENARIO_QUESTION: &str = "Solve (x-1)/2 = 1";

pub const SCENARIO_JSON: &str = r#"{
  "final_answer": "x=3",
  "steps": [{"title": "Isolate x", "explanation": "Multiply both sides by $2$, then add $1$."}],
  "verified": true,
  "confidence": 0.92,
  "difficulty": 1,
  "model": {"provider": "google_genai", "name": "gemini-2.5-flash"}
}"#;

pub fn make_settings(api_base_url: &str) -> Settings {
    let mut settings = Settings {
        api_base_url: api_base_url.to_string(),
        ..Settings::default()
    };
    settings.normalize();
    settings
}

pub fn sample_response() -> SolveResponse {
    SolveResponse {
        final_answer: "x=3".to_string(),
        steps: vec![Step {
            title: "Isolate x".to_string(),
            explanation: "Multiply both sides by $2$, then add $1$.".to_string(),
        }],
        verified: true,
        latex: None,
        level: None,
        confidence: Some(0.92),
        difficulty: Some(1.0),
        model: Some(ModelInfo {
            provider: "google_genai".to_string(),
            name: "gemini-2.5-flash".to_string(),
        }),
    }
}

/// PNG signature followed by filler; enough for mime sniffing.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    bytes.extend_from_slice(&[0u8; 24]);
    bytes
}

pub fn png_input() -> Result<ImageInput, ValidationError> {
    ImageInput::from_bytes("worksheet.png", png_bytes())
}

#[derive(Debug, Clone)]
pub enum Reply {
    Answer(SolveResponse),
    Service { status: u16, message: String },
}

impl Reply {
    fn into_result(self) -> SolveResult<SolveResponse> {
        match self {
            Reply::Answer(response) => Ok(response),
            Reply::Service { status, message } => Err(SolveError::service(status, message)),
        }
    }
}

/// Scripted [`SolveService`]. A gated mode waits for its [`Notify`] before replying.
pub struct FakeService {
    pub text: Reply,
    pub image: Reply,
    pub text_gate: Option<Arc<Notify>>,
    pub image_gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl FakeService {
    pub fn new(text: Reply, image: Reply) -> Self {
        Self {
            text,
            image,
            text_gate: None,
            image_gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering() -> Self {
        Self::new(
            Reply::Answer(sample_response()),
            Reply::Answer(sample_response()),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolveService for FakeService {
    async fn solve_text(&self, request: &SolveRequest) -> SolveResult<SolveResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.text_gate {
            gate.notified().await;
        }
        self.text.clone().into_result().map(|mut response| {
            if response.final_answer.is_empty() {
                response.final_answer = request.question().to_string();
            }
            response
        })
    }

    async fn solve_image(&self, _image: &ImageInput) -> SolveResult<ImageSolveResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.image_gate {
            gate.notified().await;
        }
        self.image.clone().into_result().map(|result| ImageSolveResponse {
            ocr_text: "2x = 6".to_string(),
            result,
        })
    }

    async fn health(&self) -> SolveResult<HealthStatus> {
        Ok(HealthStatus {
            ok: true,
            ..HealthStatus::default()
        })
    }
}

/// Must be called inside a tokio runtime.
pub fn session_with(service: Arc<dyn SolveService>, settings: Settings) -> Session {
    let (dispatcher, settlements) = Dispatcher::new(service, Handle::current());
    Session::new(settings, dispatcher, settlements)
}

/// One request as the stub server saw it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: String,
    pub body: Vec<u8>,
}

/// Single-shot HTTP/1.1 server that answers one request with a canned reply.
pub struct StubServer {
    pub base_url: String,
    request: JoinHandle<std::io::Result<CapturedRequest>>,
}

impl StubServer {
    pub async fn start(status: u16, body: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let body = body.to_string();
        let request = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await?;
            let captured = read_request(&mut stream).await?;
            let response = format!(
                "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await?;
            stream.shutdown().await?;
            Ok::<_, std::io::Error>(captured)
        });
        Ok(Self { base_url, request })
    }

    pub async fn captured(self) -> std::io::Result<CapturedRequest> {
        self.request.await.map_err(std::io::Error::other)?
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> std::io::Result<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let (request_line, headers) = head.split_once("\r\n").unwrap_or((head.as_str(), ""));
    let (request_line, headers) = (request_line.to_string(), headers.to_ascii_lowercase());
    let mut body = buf[header_end + 4..].to_vec();

    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());
    let chunked = headers.contains("transfer-encoding: chunked");

    loop {
        let done = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => find(&body, b"0\r\n\r\n").is_some(),
            None => true,
        };
        if done {
            break;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use solver_application::view::plain_report;
    use solver_application::{Applied, Badge, SubmitRejected};
    use solver_client::{CONNECTIVITY_MESSAGE, HttpSolveClient};
    use solver_core::{Mode, SettlementPolicy};

    use super::*;

    fn http_session(base_url: &str) -> Session {
        let settings = make_settings(base_url);
        let client = HttpSolveClient::new(&settings).unwrap();
        session_with(Arc::new(client), settings)
    }

    #[test]
    fn builds_settings() {
        let settings = make_settings("http://solver.test/");
        assert_eq!(settings.api_base_url, "http://solver.test");
    }

    #[tokio::test]
    async fn text_question_end_to_end() {
        let server = StubServer::start(200, SCENARIO_JSON).await.unwrap();
        let mut session = http_session(&server.base_url);

        session.submit_text(SCENARIO_QUESTION).unwrap().await.unwrap();
        assert_eq!(session.poll(), vec![Applied::Result(Mode::Text)]);

        let view = session.result_view().unwrap();
        assert_eq!(view.final_answer, "x=3");
        assert_eq!(view.badge, Badge::Verified);
        assert_eq!(view.confidence.map(|c| c.label()).as_deref(), Some("92%"));
        assert_eq!(view.model.as_deref(), Some("google_genai / gemini-2.5-flash"));
        let steps = session.steps().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps.sections()[0].header, "Isolate x");
        assert!(session.controller.error().is_none());

        let report = plain_report(&view, session.steps());
        assert!(report.contains("Final Answer: x=3"));
        assert!(report.contains("Multiply both sides by 2, then add 1."));

        let request = server.captured().await.unwrap();
        assert_eq!(request.request_line, "POST /solve-text HTTP/1.1");
        assert!(request.headers.contains("content-type: application/json"));
        let body = String::from_utf8(request.body).unwrap();
        assert!(body.contains(r#""question":"Solve (x-1)/2 = 1""#));
        assert!(body.contains(r#""level":"auto""#));
        assert!(body.contains(r#""locale":"en""#));
    }

    #[tokio::test]
    async fn image_upload_end_to_end() {
        let body = format!(r#"{{"ocr_text": "(x-1)/2 = 1", "result": {SCENARIO_JSON}}}"#);
        let server = StubServer::start(200, &body).await.unwrap();
        let mut session = http_session(&server.base_url);

        let image = png_input().unwrap();
        session.submit_image(Some(&image)).unwrap().await.unwrap();
        assert_eq!(session.poll(), vec![Applied::Result(Mode::Image)]);

        let view = session.result_view().unwrap();
        assert_eq!(view.title, "Image Solution");
        assert_eq!(view.ocr_hint.as_deref(), Some("(x-1)/2 = 1"));
        assert!(session.controller.result().text().is_none());

        let request = server.captured().await.unwrap();
        assert_eq!(request.request_line, "POST /solve-image HTTP/1.1");
        assert!(request.headers.contains("multipart/form-data"));
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains(r#"name="file""#));
        assert!(body.contains(r#"filename="worksheet.png""#));
        assert!(body.contains("image/png"));
    }

    #[tokio::test]
    async fn service_message_is_shown_verbatim() {
        let server = StubServer::start(400, r#"{"message": "bad input"}"#).await.unwrap();
        let mut session = http_session(&server.base_url);

        session.submit_text("???").unwrap().await.unwrap();
        assert_eq!(session.poll(), vec![Applied::Error(Mode::Text)]);
        assert_eq!(session.controller.error(), Some("bad input"));
        assert!(session.result_view().is_none());
    }

    #[tokio::test]
    async fn server_error_without_message_uses_fallback() {
        let server = StubServer::start(500, "{}").await.unwrap();
        let mut session = http_session(&server.base_url);

        let image = png_input().unwrap();
        session.submit_image(Some(&image)).unwrap().await.unwrap();
        session.poll();
        assert_eq!(session.controller.error(), Some("Image solve failed."));
    }

    #[tokio::test]
    async fn unreachable_service_reports_connectivity() {
        let mut session = http_session("http://127.0.0.1:9");
        session.submit_text("1+1").unwrap().await.unwrap();
        session.poll();
        assert_eq!(session.controller.error(), Some(CONNECTIVITY_MESSAGE));
    }

    #[tokio::test]
    async fn empty_inputs_never_reach_the_service() {
        let service = Arc::new(FakeService::answering());
        let mut session = session_with(service.clone(), make_settings("http://unused"));

        assert!(matches!(session.submit_text(" \n\t"), Err(SubmitRejected::Invalid(_))));
        assert_eq!(session.controller.error(), Some("Please enter a math question."));
        assert!(matches!(session.submit_image(None), Err(SubmitRejected::Invalid(_))));
        assert_eq!(session.controller.error(), Some("Please choose an image (PNG/JPG)."));
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn one_submission_per_mode_while_in_flight() {
        let gate = Arc::new(Notify::new());
        let mut fake = FakeService::answering();
        fake.text_gate = Some(gate.clone());
        let service = Arc::new(fake);
        let mut session = session_with(service.clone(), make_settings("http://unused"));

        let first = session.submit_text("1+1").unwrap();
        assert!(matches!(
            session.submit_text("2+2"),
            Err(SubmitRejected::Busy(Mode::Text))
        ));
        let image = session.submit_image(Some(&png_input().unwrap())).unwrap();
        image.await.unwrap();

        gate.notify_one();
        first.await.unwrap();
        session.poll();
        assert!(!session.controller.is_submitting(Mode::Text));
        assert_eq!(service.calls(), 2);
        assert!(session.submit_text("3+3").is_ok());
    }

    async fn race(policy: SettlementPolicy) -> Session {
        let gate = Arc::new(Notify::new());
        let mut text = sample_response();
        text.final_answer = "from text".to_string();
        let mut fake = FakeService::new(Reply::Answer(text), Reply::Answer(sample_response()));
        fake.text_gate = Some(gate.clone());

        let mut settings = make_settings("http://unused");
        settings.settlement_policy = policy;
        let mut session = session_with(Arc::new(fake), settings);

        let slow_text = session.submit_text("first").unwrap();
        let fast_image = session.submit_image(Some(&png_input().unwrap())).unwrap();
        fast_image.await.unwrap();
        assert_eq!(session.poll(), vec![Applied::Result(Mode::Image)]);

        gate.notify_one();
        slow_text.await.unwrap();
        session
    }

    #[tokio::test]
    async fn stale_text_reply_does_not_replace_newer_image_result() {
        let mut session = race(SettlementPolicy::LatestIssued).await;
        assert_eq!(session.poll(), vec![Applied::Discarded(Mode::Text)]);
        assert_eq!(session.result_view().unwrap().title, "Image Solution");
        assert!(!session.controller.is_submitting(Mode::Text));
    }

    #[tokio::test]
    async fn last_settled_policy_lets_late_reply_win() {
        let mut session = race(SettlementPolicy::LastSettled).await;
        assert_eq!(session.poll(), vec![Applied::Result(Mode::Text)]);
        let view = session.result_view().unwrap();
        assert_eq!(view.title, "Text Solution");
        assert_eq!(view.final_answer, "from text");
        assert!(session.controller.result().image().is_none());
    }

    #[tokio::test]
    async fn failure_after_success_keeps_previous_result() {
        let fake = FakeService::new(
            Reply::Answer(sample_response()),
            Reply::Service {
                status: 422,
                message: "Could not read the photo.".to_string(),
            },
        );
        let mut session = session_with(Arc::new(fake), make_settings("http://unused"));

        session.submit_text(SCENARIO_QUESTION).unwrap().await.unwrap();
        session.submit_image(Some(&png_input().unwrap())).unwrap().await.unwrap();
        assert_eq!(
            session.poll(),
            vec![Applied::Result(Mode::Text), Applied::Error(Mode::Image)]
        );
        assert_eq!(session.controller.error(), Some("Could not read the photo."));
        assert_eq!(session.result_view().unwrap().final_answer, "x=3");
    }
}
