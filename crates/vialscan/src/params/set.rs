use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::definition::{odd_at_least, ParamId, PARAM_COUNT, PARAM_DEFS};
use crate::detect::DetectParams;

/// Current values and lock flags of all nine tunable parameters.
///
/// Writes go through [`ParameterSet::set`], which applies odd coercion for
/// kernel-size parameters. Values outside `[min, max]` are stored as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ParameterSetRepr", into = "ParameterSetRepr")]
pub struct ParameterSet {
    values: [f64; PARAM_COUNT],
    locked: [bool; PARAM_COUNT],
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ParameterSet {
    /// All parameters at their defaults, all locked.
    pub fn defaults() -> Self {
        let mut values = [0.0; PARAM_COUNT];
        for d in &PARAM_DEFS {
            values[d.id.index()] = d.default;
        }
        Self {
            values,
            locked: [true; PARAM_COUNT],
        }
    }

    pub fn get(&self, id: ParamId) -> f64 {
        self.values[id.index()]
    }

    /// Store `value` for `id` and return what was actually stored.
    ///
    /// Kernel-size parameters are rounded up to the nearest odd integer.
    pub fn set(&mut self, id: ParamId, value: f64) -> f64 {
        let stored = if id.definition().requires_odd() {
            odd_at_least(value) as f64
        } else {
            value
        };
        self.values[id.index()] = stored;
        stored
    }

    pub fn is_locked(&self, id: ParamId) -> bool {
        self.locked[id.index()]
    }

    pub fn set_locked(&mut self, id: ParamId, locked: bool) {
        self.locked[id.index()] = locked;
    }

    /// Unlock exactly the given parameters; everything else becomes locked.
    pub fn unlock_only(&mut self, ids: &[ParamId]) {
        self.locked = [true; PARAM_COUNT];
        for id in ids {
            self.locked[id.index()] = false;
        }
    }

    /// Parameters the optimizer may vary, in table order.
    pub fn unlocked(&self) -> Vec<ParamId> {
        ParamId::ALL
            .into_iter()
            .filter(|id| !self.is_locked(*id))
            .collect()
    }

    /// Restore every value to its default. Lock flags are kept.
    pub fn reset_to_defaults(&mut self) {
        for d in &PARAM_DEFS {
            self.values[d.id.index()] = d.default;
        }
    }

    /// Iterate `(id, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, f64)> + '_ {
        ParamId::ALL.into_iter().map(|id| (id, self.get(id)))
    }

    /// `true` when `MIN_BLOB_AREA > MAX_BLOB_AREA` after integer truncation.
    ///
    /// Detection still runs in that case and reports zero blobs.
    pub fn area_window_inverted(&self) -> bool {
        let p = self.detect_params();
        p.min_blob_area > p.max_blob_area
    }

    /// Resolve to the typed values the detection pipeline consumes.
    pub fn detect_params(&self) -> DetectParams {
        DetectParams {
            x_min: self.get(ParamId::XMin) as i64,
            x_max: self.get(ParamId::XMax) as i64,
            y_min: self.get(ParamId::YMin) as i64,
            y_max: self.get(ParamId::YMax) as i64,
            brightness_percentile: self.get(ParamId::BrightnessPercentile),
            min_blob_area: self.get(ParamId::MinBlobArea) as i64,
            max_blob_area: self.get(ParamId::MaxBlobArea) as i64,
            blur_size: self.get(ParamId::BlurSize) as i64,
            morph_kernel_size: self.get(ParamId::MorphKernelSize) as i64,
        }
    }
}

/// On-disk layout: name → value map plus the list of unlocked names.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParameterSetRepr {
    #[serde(default)]
    values: BTreeMap<ParamId, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unlocked: Vec<ParamId>,
}

impl From<ParameterSetRepr> for ParameterSet {
    fn from(repr: ParameterSetRepr) -> Self {
        let mut set = ParameterSet::defaults();
        for (id, value) in repr.values {
            set.set(id, value);
        }
        set.unlock_only(&repr.unlocked);
        set
    }
}

impl From<ParameterSet> for ParameterSetRepr {
    fn from(set: ParameterSet) -> Self {
        Self {
            values: set.iter().collect(),
            unlocked: set.unlocked(),
        }
    }
}
