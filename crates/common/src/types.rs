use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};
use std::str::FromStr;

/// Opaque identifier of one grid instance (a world), stable while it stays loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A 2D cell (chunk) coordinate in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    pub const ORIGIN: Self = Self { x: 0, z: 0 };

    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Inclusive rectangular cell area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub start_x: i32,
    pub end_x: i32,
    pub start_z: i32,
    pub end_z: i32,
}

impl Bounds {
    /// Area spanning `x_radius`/`z_radius` cells on each side of `center`.
    ///
    /// Saturates at the edges of the `i32` range instead of wrapping.
    pub fn around(center: CellCoord, x_radius: u32, z_radius: u32) -> Self {
        Self {
            start_x: center.x.saturating_sub_unsigned(x_radius),
            end_x: center.x.saturating_add_unsigned(x_radius),
            start_z: center.z.saturating_sub_unsigned(z_radius),
            end_z: center.z.saturating_add_unsigned(z_radius),
        }
    }

    /// Number of cells covered, both ends inclusive.
    pub fn cell_count(&self) -> u64 {
        let width = (i64::from(self.end_x) - i64::from(self.start_x) + 1).max(0) as u64;
        let depth = (i64::from(self.end_z) - i64::from(self.start_z) + 1).max(0) as u64;
        width * depth
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        (self.start_x..=self.end_x).contains(&coord.x)
            && (self.start_z..=self.end_z).contains(&coord.z)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}]",
            self.start_x, self.end_x, self.start_z, self.end_z
        )
    }
}

/// How the target area of a region is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMode {
    /// `x_radius`/`z_radius` cells on each side of the region's spawn cell.
    SpawnCentered { x_radius: u32, z_radius: u32 },
    /// Half of `x_radius`/`z_radius` (integer division) on each side of the origin.
    FixedExtent { x_radius: u32, z_radius: u32 },
}

impl GenerationMode {
    pub fn new(kind: GenerationKind, x_radius: u32, z_radius: u32) -> Self {
        match kind {
            GenerationKind::Spawn => Self::SpawnCentered { x_radius, z_radius },
            GenerationKind::Fixed => Self::FixedExtent { x_radius, z_radius },
        }
    }

    pub fn kind(&self) -> GenerationKind {
        match self {
            Self::SpawnCentered { .. } => GenerationKind::Spawn,
            Self::FixedExtent { .. } => GenerationKind::Fixed,
        }
    }

    /// Whether the area depends on the region's spawn cell.
    pub fn needs_spawn(&self) -> bool {
        matches!(self, Self::SpawnCentered { .. })
    }

    /// Bounds for this mode. `spawn` is ignored by `FixedExtent`.
    pub fn bounds(&self, spawn: CellCoord) -> Bounds {
        match *self {
            Self::SpawnCentered { x_radius, z_radius } => Bounds::around(spawn, x_radius, z_radius),
            Self::FixedExtent { x_radius, z_radius } => {
                Bounds::around(CellCoord::ORIGIN, x_radius / 2, z_radius / 2)
            }
        }
    }
}

/// Selector for the `GenerationMode` variant, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    #[default]
    Spawn,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown generation kind '{0}', expected 'spawn' or 'fixed'")]
pub struct UnknownGenerationKind(pub String);

impl FromStr for GenerationKind {
    type Err = UnknownGenerationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawn" => Ok(Self::Spawn),
            "fixed" => Ok(Self::Fixed),
            other => Err(UnknownGenerationKind(other.to_string())),
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spawn => "spawn",
            Self::Fixed => "fixed",
        })
    }
}

/// Per-region drain rate: at most `max_concurrent` queue pops every `period` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub max_concurrent: NonZeroUsize,
    pub period: NonZeroU64,
}

impl ThrottleConfig {
    pub const DEFAULT_PERIOD: NonZeroU64 = NonZeroU64::new(10).unwrap();

    pub fn new(max_concurrent: NonZeroUsize) -> Self {
        Self {
            max_concurrent,
            period: Self::DEFAULT_PERIOD,
        }
    }

    pub fn with_period(mut self, period: NonZeroU64) -> Self {
        self.period = period;
        self
    }
}
