//! Exported configuration snippet.
//!
//! The snippet is pasted verbatim into the constant block of the batch
//! analysis scripts, so names and number formatting are fixed:
//!
//! ```text
//! # Detection Parameters
//! X_MIN, X_MAX = 1570, 5790
//! Y_MIN, Y_MAX = 1980, 3632
//! BRIGHTNESS_PERCENTILE = 96.66080167002514
//! MIN_BLOB_AREA = 94603
//! MAX_BLOB_AREA = 4598289
//! BLUR_SIZE = 51
//! MORPH_KERNEL_SIZE = 37
//! ```

use super::definition::ParamId;
use super::set::ParameterSet;

/// Errors from parsing a snippet back into a [`ParameterSet`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnippetError {
    /// Left and right side of an assignment list different counts.
    #[error("line {line}: {names} names but {values} values")]
    Arity {
        line: usize,
        names: usize,
        values: usize,
    },
    /// A value could not be parsed as a number.
    #[error("line {line}: invalid value {value:?} for {name}")]
    InvalidValue {
        line: usize,
        name: String,
        value: String,
    },
}

/// Render the nine parameters in the exact form the batch scripts expect.
pub fn to_snippet(params: &ParameterSet) -> String {
    let int = |id: ParamId| params.get(id) as i64;
    let mut out = String::from("# Detection Parameters\n");
    out.push_str(&format!(
        "X_MIN, X_MAX = {}, {}\n",
        int(ParamId::XMin),
        int(ParamId::XMax)
    ));
    out.push_str(&format!(
        "Y_MIN, Y_MAX = {}, {}\n",
        int(ParamId::YMin),
        int(ParamId::YMax)
    ));
    out.push_str(&format!(
        "BRIGHTNESS_PERCENTILE = {}\n",
        format_real(params.get(ParamId::BrightnessPercentile))
    ));
    out.push_str(&format!("MIN_BLOB_AREA = {}\n", int(ParamId::MinBlobArea)));
    out.push_str(&format!("MAX_BLOB_AREA = {}\n", int(ParamId::MaxBlobArea)));
    out.push_str(&format!("BLUR_SIZE = {}\n", int(ParamId::BlurSize)));
    out.push_str(&format!(
        "MORPH_KERNEL_SIZE = {}\n",
        int(ParamId::MorphKernelSize)
    ));
    out
}

/// Shortest round-trip representation, always carrying a decimal point.
fn format_real(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Parse a snippet, starting from `base` for anything the text does not set.
///
/// Comments, blank lines and assignments to unknown names are ignored.
/// Lock flags of `base` are kept.
pub fn from_snippet(text: &str, base: &ParameterSet) -> Result<ParameterSet, SnippetError> {
    let mut params = base.clone();
    for (line_idx, raw) in text.lines().enumerate() {
        let line_no = line_idx + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        let Some((lhs, rhs)) = line.split_once('=') else {
            continue;
        };
        let names: Vec<&str> = lhs.split(',').map(str::trim).collect();
        let values: Vec<&str> = rhs.split(',').map(str::trim).collect();
        if names.len() != values.len() {
            return Err(SnippetError::Arity {
                line: line_no,
                names: names.len(),
                values: values.len(),
            });
        }
        for (name, value) in names.into_iter().zip(values) {
            let Ok(id) = name.parse::<ParamId>() else {
                tracing::debug!("snippet line {}: ignoring unknown name {}", line_no, name);
                continue;
            };
            let parsed: f64 = value.parse().map_err(|_| SnippetError::InvalidValue {
                line: line_no,
                name: name.to_string(),
                value: value.to_string(),
            })?;
            params.set(id, parsed);
        }
    }
    Ok(params)
}
