//! Detector model registry.
//!
//! Each variant of [`DetectorModel`] fixes the calibration constants of one
//! detector: unbinned sensor geometry, saturation threshold, the dead zones
//! between sensor tiles and the beamline counter names. The constants live in
//! data tables rather than per-model code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

/// Index band along one axis of the unbinned frame.
///
/// Bands are half-open (`start..end`) and clamped to the frame when applied,
/// matching NumPy slicing semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// The whole axis.
    All,
    /// `start..end`.
    Range(usize, usize),
    /// The last `n` indices of the axis.
    Tail(usize),
}

impl Band {
    /// Resolve the band against an axis of length `len`.
    pub(crate) fn resolve(&self, len: usize) -> (usize, usize) {
        match *self {
            Band::All => (0, len),
            Band::Range(start, end) => (start.min(len), end.min(len)),
            Band::Tail(n) => (len.saturating_sub(n), len),
        }
    }
}

/// Rectangular dead zone between sensor tiles (rows x columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRegion {
    pub rows: Band,
    pub cols: Band,
}

const fn gap(rows: Band, cols: Band) -> GapRegion {
    GapRegion { rows, cols }
}

/// Cross of two 6-pixel bands between the four Maxipix chips.
const MAXIPIX_GAPS: &[GapRegion] = &[
    gap(Band::All, Band::Range(255, 261)),
    gap(Band::Range(255, 261), Band::All),
];

/// Eiger2M tile seams plus the known bad-pixel regions of the ID01 unit.
const EIGER2M_GAPS: &[GapRegion] = &[
    gap(Band::All, Band::Range(255, 259)),
    gap(Band::All, Band::Range(513, 517)),
    gap(Band::All, Band::Range(771, 775)),
    gap(Band::Range(0, 257), Band::Range(72, 80)),
    gap(Band::Range(255, 259), Band::All),
    gap(Band::Range(511, 552), Band::All),
    gap(Band::Range(804, 809), Band::All),
    gap(Band::Range(1061, 1102), Band::All),
    gap(Band::Range(1355, 1359), Band::All),
    gap(Band::Range(1611, 1652), Band::All),
    gap(Band::Range(1905, 1909), Band::All),
    gap(Band::Range(1248, 1290), Band::Range(478, 479)),
    gap(Band::Range(1214, 1298), Band::Range(481, 482)),
    gap(Band::Range(1649, 1910), Band::Range(620, 628)),
];

/// Eiger4M: 1-pixel border, one vertical seam, three horizontal seams.
const EIGER4M_GAPS: &[GapRegion] = &[
    gap(Band::All, Band::Range(0, 1)),
    gap(Band::All, Band::Tail(1)),
    gap(Band::Range(0, 1), Band::All),
    gap(Band::Tail(1), Band::All),
    gap(Band::All, Band::Range(1029, 1041)),
    gap(Band::Range(513, 552), Band::All),
    gap(Band::Range(1064, 1103), Band::All),
    gap(Band::Range(1615, 1654), Band::All),
];

/// Cross of two 5-pixel bands between the four Merlin chips.
const MERLIN_GAPS: &[GapRegion] = &[
    gap(Band::All, Band::Range(255, 260)),
    gap(Band::Range(255, 260), Band::All),
];

/// Default geometry of the [`DetectorModel::Dummy`] detector.
pub const DUMMY_PIXEL_NUMBER: (usize, usize) = (516, 516);
/// Default pixel pitch of the [`DetectorModel::Dummy`] detector, in meters.
pub const DUMMY_PIXEL_SIZE: f64 = 55e-6;

/// 2D detectors used for BCDI data acquisition.
#[derive(EnumIter, Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DetectorModel {
    Maxipix,
    Eiger2M,
    Eiger4M,
    Timepix,
    Merlin,
    /// Stand-in detector for simulated data, geometry can be overriden at
    /// configuration time.
    Dummy,
}

impl DetectorModel {
    /// Number of pixels (vertical, horizontal) of the unbinned detector.
    pub fn unbinned_pixel_number(&self) -> (usize, usize) {
        match self {
            DetectorModel::Maxipix => (516, 516),
            DetectorModel::Eiger2M => (2164, 1030),
            DetectorModel::Eiger4M => (2167, 2070),
            DetectorModel::Timepix => (256, 256),
            DetectorModel::Merlin => (515, 515),
            DetectorModel::Dummy => DUMMY_PIXEL_NUMBER,
        }
    }

    /// Pixel size (vertical, horizontal) of the unbinned detector in meters.
    pub fn unbinned_pixel_size(&self) -> (f64, f64) {
        match self {
            DetectorModel::Maxipix
            | DetectorModel::Timepix
            | DetectorModel::Merlin => (55e-6, 55e-6),
            DetectorModel::Eiger2M | DetectorModel::Eiger4M => (75e-6, 75e-6),
            DetectorModel::Dummy => (DUMMY_PIXEL_SIZE, DUMMY_PIXEL_SIZE),
        }
    }

    /// Counts per pixel and per frame above which the detector response is
    /// unreliable, `None` when no saturation behavior is documented.
    pub fn saturation_threshold(&self) -> Option<f64> {
        match self {
            DetectorModel::Maxipix | DetectorModel::Eiger2M | DetectorModel::Merlin => Some(1e6),
            DetectorModel::Eiger4M => Some(4e9),
            DetectorModel::Timepix | DetectorModel::Dummy => None,
        }
    }

    /// Dead zones of the detector, over the unbinned un-cropped frame.
    pub fn gap_regions(&self) -> &'static [GapRegion] {
        match self {
            DetectorModel::Maxipix => MAXIPIX_GAPS,
            DetectorModel::Eiger2M => EIGER2M_GAPS,
            DetectorModel::Eiger4M => EIGER4M_GAPS,
            DetectorModel::Merlin => MERLIN_GAPS,
            DetectorModel::Timepix | DetectorModel::Dummy => &[],
        }
    }

    /// Name of the counter for the image number in the log file, for
    /// detectors installed at a known beamline.
    pub fn counter(&self, beamline: &str) -> Option<&'static str> {
        match (self, beamline) {
            (DetectorModel::Maxipix, "ID01") => Some("mpx4inr"),
            (DetectorModel::Eiger2M, "ID01") => Some("ei2minr"),
            _ => None,
        }
    }
}

impl fmt::Display for DetectorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorModel::Maxipix => write!(f, "Maxipix"),
            DetectorModel::Eiger2M => write!(f, "Eiger2M"),
            DetectorModel::Eiger4M => write!(f, "Eiger4M"),
            DetectorModel::Timepix => write!(f, "Timepix"),
            DetectorModel::Merlin => write!(f, "Merlin"),
            DetectorModel::Dummy => write!(f, "Dummy"),
        }
    }
}

/// Error returned when a detector name does not match any implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("no detector implementation for '{0}'")]
pub struct UnknownDetector(pub String);

impl FromStr for DetectorModel {
    type Err = UnknownDetector;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Maxipix" => Ok(DetectorModel::Maxipix),
            "Eiger2M" => Ok(DetectorModel::Eiger2M),
            "Eiger4M" => Ok(DetectorModel::Eiger4M),
            "Timepix" => Ok(DetectorModel::Timepix),
            "Merlin" => Ok(DetectorModel::Merlin),
            "Dummy" => Ok(DetectorModel::Dummy),
            _ => Err(UnknownDetector(name.to_string())),
        }
    }
}
