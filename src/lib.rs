//! Detector models and frame corrections for Bragg coherent X-ray
//! diffraction imaging (BCDI).
//!
//! The crate handles the detector configuration used for data acquisition and
//! the per-pixel corrections applied to raw diffraction frames. The available
//! detectors are:
//!
//! - Maxipix
//! - Eiger2M
//! - Eiger4M
//! - Timepix
//! - Merlin
//! - Dummy
//!
//! A [`Detector`] is built once per acquisition session and then fed raw
//! frames together with an exclusion mask:
//!
//! ```
//! use bcdi_detector::{Corrections, Detector, DetectorModel};
//! use ndarray::Array2;
//!
//! let detector = Detector::builder(DetectorModel::Maxipix)
//!     .sample_name("S0042")
//!     .build()?;
//! let mut data = Array2::<f64>::zeros((516, 516));
//! let mut mask = Array2::<u8>::zeros((516, 516));
//! detector.mask_detector(&mut data, &mut mask, Corrections::default())?;
//! // the chip gaps are now excluded from further analysis
//! assert_eq!(mask[[255, 0]], 1);
//! # Ok::<(), bcdi_detector::Error>(())
//! ```

pub mod config;
pub mod corrections;
pub mod detector;
mod error;
pub mod model;

pub use config::{ConfigError, DetectorBuilder, LinearityFn};
pub use corrections::{CorrectionError, Corrections};
pub use detector::{Detector, DetectorParams};
pub use error::Error;
pub use model::{Band, DetectorModel, GapRegion, UnknownDetector};
