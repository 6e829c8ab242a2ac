use std::collections::BTreeSet;

use css_blocks::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Position>,
}

impl SourceSpan {
    pub fn at(line: u32, column: u32) -> Self {
        SourceSpan {
            start: Position { line, column },
            end: None,
        }
    }
}

/// Styles of which at most one applies at a time. When `optional`, none of
/// them may apply either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub styles: Vec<ObjectId>,
    pub optional: bool,
}

impl Correlation {
    pub fn contains(&self, style: ObjectId) -> bool {
        self.styles.contains(&style)
    }
}

/// The styles one element can have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementAnalysis {
    id: String,
    loc: SourceSpan,
    static_styles: BTreeSet<ObjectId>,
    correlations: Vec<Correlation>,
}

impl ElementAnalysis {
    pub(crate) fn new(id: String, loc: SourceSpan) -> Self {
        ElementAnalysis {
            id,
            loc,
            static_styles: BTreeSet::new(),
            correlations: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn loc(&self) -> SourceSpan {
        self.loc
    }

    /// Styles that always apply.
    pub fn static_styles(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.static_styles.iter().copied()
    }

    pub fn correlations(&self) -> &[Correlation] {
        &self.correlations
    }

    /// Every style that may apply, static or not.
    pub fn all_styles(&self) -> BTreeSet<ObjectId> {
        let mut styles = self.static_styles.clone();
        for correlation in &self.correlations {
            styles.extend(correlation.styles.iter().copied());
        }
        styles
    }

    pub fn has_static(&self, style: ObjectId) -> bool {
        self.static_styles.contains(&style)
    }

    /// Whether `a` and `b` can apply at the same time. Members of one
    /// correlation exclude each other.
    pub fn may_coexist(&self, a: ObjectId, b: ObjectId) -> bool {
        a != b
            && !self
                .correlations
                .iter()
                .any(|correlation| correlation.contains(a) && correlation.contains(b))
    }

    pub(crate) fn add_static(&mut self, style: ObjectId) {
        self.static_styles.insert(style);
    }

    pub(crate) fn add_correlation(&mut self, correlation: Correlation) {
        self.correlations.push(correlation);
    }
}
