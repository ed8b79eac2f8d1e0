use serde::{Deserialize, Serialize};

/// Number of tunable parameters.
pub const PARAM_COUNT: usize = 9;

/// Identifier of one tunable detection parameter.
///
/// Serialized with the same upper-case names the exported snippet uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamId {
    XMin,
    XMax,
    YMin,
    YMax,
    BrightnessPercentile,
    MinBlobArea,
    MaxBlobArea,
    BlurSize,
    MorphKernelSize,
}

impl ParamId {
    /// All parameters in snippet order.
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::XMin,
        ParamId::XMax,
        ParamId::YMin,
        ParamId::YMax,
        ParamId::BrightnessPercentile,
        ParamId::MinBlobArea,
        ParamId::MaxBlobArea,
        ParamId::BlurSize,
        ParamId::MorphKernelSize,
    ];

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::XMin => "X_MIN",
            Self::XMax => "X_MAX",
            Self::YMin => "Y_MIN",
            Self::YMax => "Y_MAX",
            Self::BrightnessPercentile => "BRIGHTNESS_PERCENTILE",
            Self::MinBlobArea => "MIN_BLOB_AREA",
            Self::MaxBlobArea => "MAX_BLOB_AREA",
            Self::BlurSize => "BLUR_SIZE",
            Self::MorphKernelSize => "MORPH_KERNEL_SIZE",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Static definition (bounds, step, default) of this parameter.
    pub fn definition(self) -> &'static ParamDef {
        &PARAM_DEFS[self.index()]
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a parameter name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown parameter name: {0}")]
pub struct UnknownParam(pub String);

impl std::str::FromStr for ParamId {
    type Err = UnknownParam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownParam(wanted.to_string()))
    }
}

/// Numeric domain of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Integer-valued; the optimizer samples integers.
    Integer,
    /// Continuous.
    Real,
}

/// Definition of one tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    /// Interactive adjustment granularity.
    pub step: f64,
}

impl ParamDef {
    /// Kernel-size parameters must be odd; the role is signalled by the name.
    pub fn requires_odd(&self) -> bool {
        self.name.contains("SIZE")
    }

    /// Whether `value` lies inside `[min, max]`.
    pub fn in_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

const fn def(
    id: ParamId,
    name: &'static str,
    kind: ParamKind,
    default: f64,
    min: f64,
    max: f64,
    step: f64,
) -> ParamDef {
    ParamDef {
        id,
        name,
        kind,
        default,
        min,
        max,
        step,
    }
}

/// Parameter table, indexed by [`ParamId`] discriminant.
///
/// Defaults are the tuned values the batch scripts ship with.
pub static PARAM_DEFS: [ParamDef; PARAM_COUNT] = [
    def(ParamId::XMin, "X_MIN", ParamKind::Integer, 1570.0, 0.0, 7000.0, 100.0),
    def(ParamId::XMax, "X_MAX", ParamKind::Integer, 5790.0, 0.0, 7000.0, 100.0),
    def(ParamId::YMin, "Y_MIN", ParamKind::Integer, 1980.0, 0.0, 5000.0, 100.0),
    def(ParamId::YMax, "Y_MAX", ParamKind::Integer, 3632.0, 0.0, 5000.0, 100.0),
    def(
        ParamId::BrightnessPercentile,
        "BRIGHTNESS_PERCENTILE",
        ParamKind::Real,
        96.66080167002514,
        80.0,
        99.9,
        0.5,
    ),
    def(
        ParamId::MinBlobArea,
        "MIN_BLOB_AREA",
        ParamKind::Integer,
        94603.0,
        10000.0,
        500000.0,
        5000.0,
    ),
    def(
        ParamId::MaxBlobArea,
        "MAX_BLOB_AREA",
        ParamKind::Integer,
        4598289.0,
        100000.0,
        5000000.0,
        10000.0,
    ),
    def(ParamId::BlurSize, "BLUR_SIZE", ParamKind::Integer, 51.0, 3.0, 51.0, 2.0),
    def(
        ParamId::MorphKernelSize,
        "MORPH_KERNEL_SIZE",
        ParamKind::Integer,
        37.0,
        3.0,
        51.0,
        2.0,
    ),
];

/// Smallest odd integer that is `>= value`.
///
/// Non-finite input maps to 1 so downstream kernels stay valid.
pub fn odd_at_least(value: f64) -> i64 {
    if !value.is_finite() {
        return 1;
    }
    let v = value.ceil() as i64;
    if v.rem_euclid(2) == 0 {
        v + 1
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for id in ParamId::ALL {
            assert_eq!(id.definition().id, id);
            assert_eq!(id.definition().name, id.name());
        }
    }

    #[test]
    fn defaults_lie_within_bounds() {
        for d in &PARAM_DEFS {
            assert!(d.in_bounds(d.default), "{} default out of range", d.name);
        }
    }

    #[test]
    fn only_size_parameters_require_odd() {
        let odd: Vec<ParamId> = PARAM_DEFS
            .iter()
            .filter(|d| d.requires_odd())
            .map(|d| d.id)
            .collect();
        assert_eq!(odd, vec![ParamId::BlurSize, ParamId::MorphKernelSize]);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("blur_size".parse::<ParamId>(), Ok(ParamId::BlurSize));
        assert_eq!(" X_MAX ".parse::<ParamId>(), Ok(ParamId::XMax));
        assert!("BLUR".parse::<ParamId>().is_err());
    }

    #[test]
    fn odd_coercion_rounds_up_to_odd() {
        assert_eq!(odd_at_least(14.0), 15);
        assert_eq!(odd_at_least(15.0), 15);
        assert_eq!(odd_at_least(15.5), 17);
        assert_eq!(odd_at_least(2.0), 3);
        assert_eq!(odd_at_least(0.0), 1);
        assert_eq!(odd_at_least(-2.0), -1);
        for requested in 0..200 {
            let k = odd_at_least(requested as f64);
            assert_eq!(k.rem_euclid(2), 1);
            assert!(k >= requested);
            assert!(k - requested <= 1);
        }
    }
}
