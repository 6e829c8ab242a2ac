use std::collections::BTreeMap;

use css_blocks::{BlockGraph, BlockId, BlockObject, ObjectId};
use tracing::{debug, trace};

use crate::element::{Correlation, ElementAnalysis, SourceSpan};
use crate::error::TemplateAnalysisError;
use crate::serialize::{SerializedAnalysis, SerializedElement, SerializedTemplate};
use crate::validate;

/// The template an analysis describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Template kind, e.g. `Opticss.JSXTemplate`.
    pub kind: String,
    pub identifier: String,
}

impl Template {
    pub fn new(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Template {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }
}

/// Element-by-element record of the block objects used by one template.
///
/// Elements are recorded one at a time: `start_element`, any number of
/// `add_*` calls, then `end_element`, which validates the element.
pub struct TemplateAnalysis<'g> {
    graph: &'g BlockGraph,
    template: Template,
    blocks: BTreeMap<String, BlockId>,
    elements: Vec<ElementAnalysis>,
    current: Option<ElementAnalysis>,
}

impl<'g> TemplateAnalysis<'g> {
    pub fn new(graph: &'g BlockGraph, template: Template) -> Self {
        TemplateAnalysis {
            graph,
            template,
            blocks: BTreeMap::new(),
            elements: Vec::new(),
            current: None,
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn graph(&self) -> &'g BlockGraph {
        self.graph
    }

    /// Make `block` available to the template as `local_name`.
    pub fn add_block(&mut self, local_name: impl Into<String>, block: BlockId) -> Result<(), TemplateAnalysisError> {
        let local_name = local_name.into();
        if self.graph.get(block).is_none() {
            return Err(self.error(format!("Block `{}` is not loaded", local_name), None));
        }
        match self.blocks.get(&local_name) {
            Some(existing) if *existing != block => Err(self.error(
                format!("The name `{}` already refers to another block", local_name),
                None,
            )),
            _ => {
                self.blocks.insert(local_name, block);
                Ok(())
            }
        }
    }

    pub fn get_block(&self, local_name: &str) -> Option<BlockId> {
        self.blocks.get(local_name).copied()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&str, BlockId)> {
        self.blocks.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// The local name `block` was added under.
    fn block_name(&self, block: BlockId) -> Option<&str> {
        self.blocks
            .iter()
            .find(|(_, id)| **id == block)
            .map(|(name, _)| name.as_str())
    }

    // -----------------------------------------------------------------------
    // Elements
    // -----------------------------------------------------------------------

    /// Open a new element. Returns its id.
    pub fn start_element(&mut self, loc: SourceSpan) -> Result<String, TemplateAnalysisError> {
        if let Some(open) = &self.current {
            return Err(self.error(
                format!("Element {} was not ended before a new one started", open.id()),
                Some(loc),
            ));
        }
        let id = self.elements.len().to_string();
        trace!(element = %id, line = loc.start.line, "start element");
        self.current = Some(ElementAnalysis::new(id.clone(), loc));
        Ok(id)
    }

    /// A style the element always has.
    pub fn add_static_style(&mut self, style: BlockObject<'_>) -> Result<(), TemplateAnalysisError> {
        let style = self.check_style(style)?;
        self.element_mut()?.add_static(style);
        Ok(())
    }

    /// A style the element has only sometimes.
    pub fn add_dynamic_style(&mut self, style: BlockObject<'_>) -> Result<(), TemplateAnalysisError> {
        self.add_exclusive_styles(false, &[style])
    }

    /// Styles of which at most one applies; with `always_one`, exactly one.
    pub fn add_exclusive_styles(
        &mut self,
        always_one: bool,
        styles: &[BlockObject<'_>],
    ) -> Result<(), TemplateAnalysisError> {
        let styles = styles
            .iter()
            .map(|style| self.check_style(*style))
            .collect::<Result<Vec<ObjectId>, _>>()?;
        self.element_mut()?.add_correlation(Correlation {
            styles,
            optional: !always_one,
        });
        Ok(())
    }

    /// Validate and record the open element.
    pub fn end_element(&mut self) -> Result<(), TemplateAnalysisError> {
        let Some(element) = self.current.take() else {
            return Err(self.error("No element was started", None));
        };
        if let Err(message) = validate::validate_element(self.graph, &element) {
            debug!(element = element.id(), %message, "invalid element");
            return Err(self.error(message, Some(element.loc())));
        }
        self.elements.push(element);
        Ok(())
    }

    pub fn elements(&self) -> &[ElementAnalysis] {
        &self.elements
    }

    fn element_mut(&mut self) -> Result<&mut ElementAnalysis, TemplateAnalysisError> {
        let template = &self.template.identifier;
        self.current.as_mut().ok_or_else(|| {
            TemplateAnalysisError::new("Styles can only be added to a started element", template.clone(), None)
        })
    }

    fn check_style(&self, style: BlockObject<'_>) -> Result<ObjectId, TemplateAnalysisError> {
        let id = style.id();
        if self.block_name(id.block).is_none() {
            return Err(self.error(
                format!(
                    "Block `{}` has not been added to the analysis of {}",
                    style.block().name(),
                    self.template.identifier
                ),
                self.current.as_ref().map(ElementAnalysis::loc),
            ));
        }
        Ok(id)
    }

    fn error(&self, message: impl Into<String>, loc: Option<SourceSpan>) -> TemplateAnalysisError {
        TemplateAnalysisError::new(message, self.template.identifier.clone(), loc)
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// `<localName><asSource>` of every style used, sorted.
    pub fn styles_found(&self) -> Vec<String> {
        let mut styles: Vec<String> = self
            .elements
            .iter()
            .flat_map(ElementAnalysis::all_styles)
            .map(|style| self.style_name(style))
            .collect();
        styles.sort();
        styles.dedup();
        styles
    }

    fn style_name(&self, style: ObjectId) -> String {
        let object = self.graph.object(style);
        let block = self.block_name(style.block).unwrap_or_else(|| object.block().name());
        format!("{}{}", block, object.as_source())
    }

    pub fn serialize(&self) -> SerializedAnalysis {
        let styles_found = self.styles_found();
        let index = |style: ObjectId| -> i64 {
            let name = self.style_name(style);
            styles_found
                .binary_search(&name)
                .map_or(-1, |position| position as i64)
        };

        let elements = self
            .elements
            .iter()
            .map(|element| {
                let mut static_styles: Vec<i64> = element.static_styles().map(index).collect();
                static_styles.sort_unstable();
                let correlations = element
                    .correlations()
                    .iter()
                    .map(|correlation| {
                        let mut indexes: Vec<i64> = correlation.styles.iter().copied().map(index).collect();
                        if correlation.optional {
                            indexes.push(-1);
                        }
                        indexes.sort_unstable();
                        indexes
                    })
                    .collect();
                let serialized = SerializedElement {
                    static_styles,
                    correlations,
                    loc: element.loc(),
                };
                (element.id().to_string(), serialized)
            })
            .collect();

        SerializedAnalysis {
            template: SerializedTemplate {
                kind: self.template.kind.clone(),
                identifier: self.template.identifier.clone(),
            },
            blocks: self
                .blocks
                .iter()
                .map(|(name, id)| (name.clone(), self.graph[*id].identifier().to_string()))
                .collect(),
            styles_found,
            elements,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.serialize())
    }
}
