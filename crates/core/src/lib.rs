//! Core domain types for the math solver client.

use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub locale: String,
    pub level: Level,
    pub request_timeout_secs: u64,
    pub settlement_policy: SettlementPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            level: Level::Auto,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            settlement_policy: SettlementPolicy::LatestIssued,
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        let url = self.api_base_url.trim().trim_end_matches('/');
        self.api_base_url = if url.is_empty() {
            DEFAULT_API_BASE_URL.to_string()
        } else {
            url.to_string()
        };

        let locale = self.locale.trim();
        self.locale = if locale.is_empty() {
            DEFAULT_LOCALE.to_string()
        } else {
            locale.to_string()
        };

        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 600);
    }

    pub fn cycle_level(&mut self) {
        self.level = match self.level {
            Level::Auto => Level::Beginner,
            Level::Beginner => Level::Intermediate,
            Level::Intermediate => Level::Advanced,
            Level::Advanced => Level::Auto,
        };
    }

    pub fn cycle_settlement_policy(&mut self) {
        self.settlement_policy = match self.settlement_policy {
            SettlementPolicy::LatestIssued => SettlementPolicy::LastSettled,
            SettlementPolicy::LastSettled => SettlementPolicy::LatestIssued,
        };
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Auto,
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Auto => "auto",
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Level::Auto),
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            _ => Err("unknown level"),
        }
    }
}

/// How settlements from the two modes compete for the result slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// A settlement older than the last applied one is dropped.
    #[default]
    LatestIssued,
    /// Whatever settles last is shown, regardless of submission order.
    LastSettled,
}

impl SettlementPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPolicy::LatestIssued => "latest_issued",
            SettlementPolicy::LastSettled => "last_settled",
        }
    }
}

impl std::fmt::Display for SettlementPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettlementPolicy {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "latest_issued" => Ok(SettlementPolicy::LatestIssued),
            "last_settled" => Ok(SettlementPolicy::LastSettled),
            _ => Err("unknown settlement policy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Text,
    Image,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Text => "text",
            Mode::Image => "image",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input problems caught locally, before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a math question.")]
    EmptyQuestion,
    #[error("Please choose an image (PNG/JPG).")]
    NoImageSelected,
    #[error("Unsupported file type {0}; please choose an image (PNG/JPG).")]
    NotAnImage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolveRequest {
    question: String,
    level: Level,
    locale: String,
}

impl SolveRequest {
    pub fn new(question: &str, level: Level, locale: &str) -> Result<Self, ValidationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        let locale = locale.trim();
        Ok(Self {
            question: question.to_string(),
            level,
            locale: if locale.is_empty() {
                DEFAULT_LOCALE.to_string()
            } else {
                locale.to_string()
            },
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    bytes: Vec<u8>,
    mime_type: String,
    file_name: String,
}

impl ImageInput {
    pub fn new(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(ValidationError::NotAnImage(mime_type));
        }
        Ok(Self {
            bytes,
            mime_type,
            file_name: file_name.into(),
        })
    }

    /// Builds an input whose mime type is sniffed from the content, then the extension.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ValidationError> {
        let file_name = file_name.into();
        let mime_type = sniff_image_mime(&bytes)
            .or_else(|| mime_from_extension(&file_name))
            .unwrap_or("application/octet-stream");
        Self::new(file_name, bytes, mime_type)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

fn mime_from_extension(file_name: &str) -> Option<&'static str> {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub name: String,
}

impl std::fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.provider, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub title: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub final_answer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<Step>,
    pub verified: bool,
    #[serde(default)]
    pub latex: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub difficulty: Option<f64>,
    #[serde(default)]
    pub model: Option<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSolveResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ocr_text: String,
    pub result: SolveResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthStatus {
    pub ok: bool,
    pub text_model: Option<String>,
    pub text_provider: Option<String>,
    pub vision_model: Option<String>,
    pub vision_provider: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_point_at_local_service() {
        let settings = Settings::default();
        assert_eq!(settings.api_base_url, "http://localhost:8000");
        assert_eq!(settings.level, Level::Auto);
        assert_eq!(settings.settlement_policy, SettlementPolicy::LatestIssued);
    }

    #[test]
    fn settings_normalize_trims_and_clamps() {
        let mut settings = Settings {
            api_base_url: " https://solver.example/api/ ".to_string(),
            locale: "  ".to_string(),
            level: Level::Advanced,
            request_timeout_secs: 0,
            settlement_policy: SettlementPolicy::LastSettled,
        };
        settings.normalize();
        assert_eq!(settings.api_base_url, "https://solver.example/api");
        assert_eq!(settings.locale, "en");
        assert_eq!(settings.request_timeout_secs, 1);

        settings.api_base_url = "/".to_string();
        settings.request_timeout_secs = 10_000;
        settings.normalize();
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(settings.request_timeout_secs, 600);
    }

    #[test]
    fn cycle_level_rotates() {
        let mut settings = Settings::default();
        settings.cycle_level();
        assert_eq!(settings.level, Level::Beginner);
        settings.cycle_level();
        settings.cycle_level();
        assert_eq!(settings.level, Level::Advanced);
        settings.cycle_level();
        assert_eq!(settings.level, Level::Auto);
    }

    #[test]
    fn level_and_policy_parse_strings() {
        assert_eq!(" AUTO ".parse::<Level>().unwrap(), Level::Auto);
        assert_eq!("Advanced".parse::<Level>().unwrap(), Level::Advanced);
        assert!("expert".parse::<Level>().is_err());
        assert_eq!(
            "last-settled".parse::<SettlementPolicy>().unwrap(),
            SettlementPolicy::LastSettled
        );
        assert!("random".parse::<SettlementPolicy>().is_err());
    }

    #[test]
    fn solve_request_rejects_blank_questions() {
        for question in ["", "   ", "\n\t "] {
            assert_eq!(
                SolveRequest::new(question, Level::Auto, "en"),
                Err(ValidationError::EmptyQuestion)
            );
        }
        let request = SolveRequest::new("  Solve x+1=2 ", Level::Auto, "").unwrap();
        assert_eq!(request.question(), "Solve x+1=2");
        assert_eq!(request.locale(), "en");
    }

    #[test]
    fn solve_request_serializes_wire_shape() {
        let request = SolveRequest::new("2+2", Level::Auto, "en").unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"question": "2+2", "level": "auto", "locale": "en"})
        );
    }

    #[test]
    fn image_input_sniffs_mime_type() {
        let png = ImageInput::from_bytes("shot", b"\x89PNG\r\n\x1a\n....".to_vec()).unwrap();
        assert_eq!(png.mime_type(), "image/png");

        let jpeg = ImageInput::from_bytes("photo.JPG", b"not really".to_vec()).unwrap();
        assert_eq!(jpeg.mime_type(), "image/jpeg");

        let err = ImageInput::from_bytes("notes.txt", b"hello".to_vec()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotAnImage("application/octet-stream".to_string())
        );
    }

    #[test]
    fn solve_response_tolerates_nulls_and_absent_fields() {
        let response: SolveResponse = serde_json::from_str(
            r#"{"final_answer":"x=3","steps":null,"verified":false,"confidence":null}"#,
        )
        .unwrap();
        assert!(response.steps.is_empty());
        assert_eq!(response.confidence, None);
        assert_eq!(response.difficulty, None);
        assert_eq!(response.model, None);
    }

    #[test]
    fn image_response_decodes_nested_result() {
        let response: ImageSolveResponse = serde_json::from_str(
            r#"{"ocr_text":"2x=4","result":{"final_answer":"x=2","steps":[{"title":"Divide","explanation":"by 2"}],"verified":true,"difficulty":0,"model":{"provider":"auto","name":"vision"}}}"#,
        )
        .unwrap();
        assert_eq!(response.ocr_text, "2x=4");
        assert_eq!(response.result.difficulty, Some(0.0));
        assert_eq!(
            response.result.model.as_ref().map(|m| m.to_string()),
            Some("auto / vision".to_string())
        );
    }
}
