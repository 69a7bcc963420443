//! Display projections of a solve result. Pure, no I/O.

use solver_core::{SolveResponse, Step};
use solver_engine::{Document, MarkdownEngine};

use crate::ResultState;

pub const EMPTY_ANSWER: &str = "(empty)";
pub const TEXT_TITLE: &str = "Text Solution";
pub const IMAGE_TITLE: &str = "Image Solution";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Verified,
    Unverified,
}

impl Badge {
    pub fn label(&self) -> &'static str {
        match self {
            Badge::Verified => "Verified",
            Badge::Unverified => "Unverified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceBar {
    pub percent: u8,
}

impl ConfidenceBar {
    pub fn from_confidence(value: Option<f64>) -> Option<Self> {
        let value = value.filter(|v| !v.is_nan())?;
        let percent = (value.clamp(0.0, 1.0) * 100.0).round() as u8;
        Some(Self { percent })
    }

    pub fn ratio(&self) -> f64 {
        f64::from(self.percent) / 100.0
    }

    pub fn label(&self) -> String {
        format!("{}%", self.percent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    pub title: &'static str,
    pub final_answer: String,
    pub badge: Badge,
    pub model: Option<String>,
    pub difficulty: Option<String>,
    pub ocr_hint: Option<String>,
    pub confidence: Option<ConfidenceBar>,
}

impl ResultView {
    pub fn project(title: &'static str, response: &SolveResponse, ocr_text: Option<&str>) -> Self {
        let final_answer =
            non_blank(&response.final_answer).unwrap_or_else(|| EMPTY_ANSWER.to_string());
        let badge = if response.verified {
            Badge::Verified
        } else {
            Badge::Unverified
        };

        Self {
            title,
            final_answer,
            badge,
            model: response.model.as_ref().map(|m| m.to_string()),
            difficulty: response
                .difficulty
                .filter(|d| d.is_finite())
                .map(|d| d.to_string()),
            ocr_hint: ocr_text.and_then(non_blank),
            confidence: ConfidenceBar::from_confidence(response.confidence),
        }
    }

    pub fn from_state(state: &ResultState) -> Option<Self> {
        match state {
            ResultState::None => None,
            ResultState::Text(response) => Some(Self::project(TEXT_TITLE, response, None)),
            ResultState::Image(image) => Some(Self::project(
                IMAGE_TITLE,
                &image.result,
                Some(&image.ocr_text),
            )),
        }
    }
}

/// Text as sent, or `None` when it is empty or only whitespace.
fn non_blank(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSection {
    pub header: String,
    pub body: Document,
    pub expanded: bool,
}

/// Independently expandable step sections; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepsView {
    sections: Vec<StepSection>,
}

impl StepsView {
    pub fn project(steps: &[Step], engine: &MarkdownEngine) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }
        let sections = steps
            .iter()
            .enumerate()
            .map(|(idx, step)| StepSection {
                header: step_header(idx, &step.title),
                body: engine.render(&step.explanation),
                expanded: false,
            })
            .collect();
        Some(Self { sections })
    }

    pub fn from_state(state: &ResultState, engine: &MarkdownEngine) -> Option<Self> {
        match state {
            ResultState::None => None,
            ResultState::Text(response) => Self::project(&response.steps, engine),
            ResultState::Image(image) => Self::project(&image.result.steps, engine),
        }
    }

    pub fn sections(&self) -> &[StepSection] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Flips one section; returns its new state, or `None` when out of range.
    pub fn toggle(&mut self, index: usize) -> Option<bool> {
        let section = self.sections.get_mut(index)?;
        section.expanded = !section.expanded;
        Some(section.expanded)
    }

    pub fn expand_all(&mut self) {
        self.sections.iter_mut().for_each(|s| s.expanded = true);
    }

    pub fn collapse_all(&mut self) {
        self.sections.iter_mut().for_each(|s| s.expanded = false);
    }
}

fn step_header(index: usize, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        format!("Step {}", index + 1)
    } else {
        title.to_string()
    }
}

/// Plain-text report with every step body shown, for non-interactive output.
pub fn plain_report(view: &ResultView, steps: Option<&StepsView>) -> String {
    let mut out = Vec::new();
    out.push(format!("{} [{}]", view.title, view.badge.label()));
    out.push(format!("Final Answer: {}", view.final_answer));
    if let Some(model) = &view.model {
        out.push(format!("Model: {model}"));
    }
    if let Some(difficulty) = &view.difficulty {
        out.push(format!("Difficulty: {difficulty}"));
    }
    if let Some(hint) = &view.ocr_hint {
        out.push(format!("OCR Hint: {hint}"));
    }
    if let Some(bar) = view.confidence {
        out.push(format!("Confidence: {}", bar.label()));
    }
    if let Some(steps) = steps {
        for section in steps.sections() {
            out.push(String::new());
            out.push(format!("## {}", section.header));
            let body = section.body.plain_text();
            if !body.is_empty() {
                out.push(body);
            }
        }
    }
    out.join("\n")
}
