use thiserror::Error;

use crate::element::SourceSpan;

/// An element carries a combination of styles that can never be valid, or
/// the analysis was driven out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", at(.template, .loc))]
pub struct TemplateAnalysisError {
    pub message: String,
    /// Identifier of the template being analyzed.
    pub template: String,
    pub loc: Option<SourceSpan>,
}

fn at(template: &str, loc: &Option<SourceSpan>) -> String {
    match loc {
        Some(span) => format!(" ({}:{}:{})", template, span.start.line, span.start.column),
        None => String::new(),
    }
}

impl TemplateAnalysisError {
    pub fn new(message: impl Into<String>, template: impl Into<String>, loc: Option<SourceSpan>) -> Self {
        TemplateAnalysisError {
            message: message.into(),
            template: template.into(),
            loc,
        }
    }
}
