//! Records which block objects each element of a template may carry, checks
//! the combinations, and serializes the result for the optimizer.

pub mod element;
pub mod error;
pub mod serialize;
pub mod template;
mod validate;

pub use element::{Correlation, ElementAnalysis, Position, SourceSpan};
pub use error::TemplateAnalysisError;
pub use serialize::{SerializedAnalysis, SerializedElement, SerializedTemplate};
pub use template::{Template, TemplateAnalysis};
