//! Tunable detection parameters.
//!
//! Nine named scalars: the four ROI bounds, the brightness percentile, the
//! blob area window and the two kernel sizes. Each carries a lock flag; the
//! optimizer only varies unlocked parameters.

mod definition;
mod set;
mod snippet;

pub use definition::{
    odd_at_least, ParamDef, ParamId, ParamKind, UnknownParam, PARAM_COUNT, PARAM_DEFS,
};
pub use set::ParameterSet;
pub use snippet::{from_snippet, to_snippet, SnippetError};

impl ParameterSet {
    /// Export as the constant block the batch scripts use.
    pub fn to_snippet(&self) -> String {
        snippet::to_snippet(self)
    }

    /// Parse a snippet on top of the defaults. All parameters come back locked.
    pub fn from_snippet(text: &str) -> Result<Self, SnippetError> {
        snippet::from_snippet(text, &ParameterSet::defaults())
    }
}
