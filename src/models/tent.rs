//! Tent model and the seeding grid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Availability of a tent. Serialized with the short codes the widget uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TentStatus {
    #[default]
    #[serde(rename = "av", alias = "available")]
    Available,
    #[serde(rename = "pr", alias = "in-process")]
    InProcess,
    #[serde(rename = "oc", alias = "occupied")]
    Occupied,
    #[serde(rename = "bl", alias = "blocked")]
    Blocked,
}

impl TentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TentStatus::Available => "av",
            TentStatus::InProcess => "pr",
            TentStatus::Occupied => "oc",
            TentStatus::Blocked => "bl",
        }
    }
}

/// A tent placed on the beach map. `x` and `y` are fractions of the map size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tent {
    pub id: i64,
    #[serde(default = "centre")]
    pub x: f64,
    #[serde(default = "centre")]
    pub y: f64,
    #[serde(rename = "state", default)]
    pub status: TentStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn centre() -> f64 {
    0.5
}

impl Tent {
    pub fn new(id: i64, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            status: TentStatus::Available,
            extra: Map::new(),
        }
    }
}

const PAD_X: f64 = 0.10;
const PAD_TOP: f64 = 0.16;
const PAD_BOTTOM: f64 = 0.10;

/// Lay `count` available tents out on a near-square grid, numbered from 1.
pub fn make_grid(count: usize) -> Vec<Tent> {
    if count == 0 {
        return Vec::new();
    }

    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    let usable_w = 1.0 - PAD_X * 2.0;
    let usable_h = 1.0 - PAD_TOP - PAD_BOTTOM;

    (0..count)
        .map(|i| {
            let r = i / cols;
            let c = i % cols;
            let x = PAD_X + ((c as f64 + 0.5) / cols as f64) * usable_w;
            let y = PAD_TOP + ((r as f64 + 0.5) / rows as f64) * usable_h;
            Tent::new(i as i64 + 1, round4(x), round4(y))
        })
        .collect()
}

/// Clamp a coordinate into the map, rejecting NaN and infinities.
pub fn clamp_unit(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
