//! Configured detector instance.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{DetectorBuilder, DetectorConfig};
use crate::model::DetectorModel;

/// A detector model bound to the configuration of one acquisition session.
///
/// Built once per session through [`DetectorBuilder`], used frame by frame in
/// [`Detector::mask_detector`](crate::Detector::mask_detector), then
/// discarded. All derived quantities are recomputed on access so they cannot
/// drift from the configuration.
///
/// # Examples
///
/// ```
/// use bcdi_detector::{Detector, DetectorModel};
///
/// let detector = Detector::builder(DetectorModel::Maxipix)
///     .binning((1, 2, 2))
///     .sample_name("S0042")
///     .build()?;
/// assert_eq!(detector.pixel_size_x(), 2. * 55e-6);
/// # Ok::<(), bcdi_detector::ConfigError>(())
/// ```
#[derive(Debug)]
pub struct Detector {
    pub(crate) model: DetectorModel,
    pub(crate) config: DetectorConfig,
}

impl Detector {
    /// Start configuring a detector of the given model.
    pub fn builder(model: DetectorModel) -> DetectorBuilder {
        DetectorBuilder::new(model)
    }

    pub fn model(&self) -> DetectorModel {
        self.model
    }

    /// Number of pixels (vertical, horizontal) of the unbinned detector,
    /// after an eventual Dummy geometry override.
    pub fn unbinned_pixel_number(&self) -> (usize, usize) {
        self.config.unbinned_pixel_number
    }

    /// Pixel size (vertical, horizontal) of the unbinned detector in meters.
    pub fn unbinned_pixel_size(&self) -> (f64, f64) {
        self.config.unbinned_pixel_size
    }

    pub fn binning(&self) -> (usize, usize, usize) {
        self.config.binning
    }

    pub fn preprocessing_binning(&self) -> (usize, usize, usize) {
        self.config.preprocessing_binning
    }

    /// Horizontal number of pixels, accounting for an eventual preprocessing
    /// binning of the reloaded data.
    pub fn nb_pixel_x(&self) -> usize {
        self.config.unbinned_pixel_number.1 / self.config.preprocessing_binning.2
    }

    /// Vertical number of pixels, accounting for an eventual preprocessing
    /// binning of the reloaded data.
    pub fn nb_pixel_y(&self) -> usize {
        self.config.unbinned_pixel_number.0 / self.config.preprocessing_binning.1
    }

    /// Horizontal pixel size in meters, after all binning factors.
    pub fn pixel_size_x(&self) -> f64 {
        self.config.unbinned_pixel_size.1
            * self.config.preprocessing_binning.2 as f64
            * self.config.binning.2 as f64
    }

    /// Vertical pixel size in meters, after all binning factors.
    pub fn pixel_size_y(&self) -> f64 {
        self.config.unbinned_pixel_size.0
            * self.config.preprocessing_binning.1 as f64
            * self.config.binning.1 as f64
    }

    /// Analysis region of interest, `[y_start, y_stop, x_start, x_stop]`.
    pub fn roi(&self) -> [usize; 4] {
        self.config.roi
    }

    /// Intensity-integration region of interest,
    /// `[y_start, y_stop, x_start, x_stop]`.
    pub fn sum_roi(&self) -> [usize; 4] {
        self.config.sum_roi
    }

    /// Counts per pixel and per frame above which pixels are clipped,
    /// `None` when saturation is not corrected for this detector.
    pub fn saturation_threshold(&self) -> Option<f64> {
        self.config.saturation_threshold
    }

    /// Name of the counter for the image number in the log file.
    pub fn counter(&self, beamline: &str) -> Option<&'static str> {
        self.model.counter(beamline)
    }

    pub fn root_dir(&self) -> Option<&str> {
        self.config.root_dir.as_deref()
    }

    pub fn data_dir(&self) -> Option<&str> {
        self.config.data_dir.as_deref()
    }

    pub fn save_dir(&self) -> Option<&str> {
        self.config.save_dir.as_deref()
    }

    pub fn sample_name(&self) -> Option<&str> {
        self.config.sample_name.as_deref()
    }

    pub fn template_file(&self) -> Option<&str> {
        self.config.template_file.as_deref()
    }

    pub fn template_imagefile(&self) -> Option<&str> {
        self.config.template_imagefile.as_deref()
    }

    pub fn specfile(&self) -> Option<&str> {
        self.config.specfile.as_deref()
    }

    /// Path of the scan, the parent folder of the data folder.
    pub fn scan_dir(&self) -> Option<PathBuf> {
        self.data_dir()
            .and_then(|dir| Path::new(dir).parent())
            .map(Path::to_path_buf)
    }

    /// Snapshot of all parameters, for logging alongside processed data.
    pub fn params(&self) -> DetectorParams {
        DetectorParams {
            name: self.model.to_string(),
            unbinned_pixel_size_m: self.unbinned_pixel_size(),
            nb_pixel_x: self.nb_pixel_x(),
            nb_pixel_y: self.nb_pixel_y(),
            binning: self.binning(),
            preprocessing_binning: self.preprocessing_binning(),
            roi: self.roi(),
            sum_roi: self.sum_roi(),
            saturation_threshold: self.saturation_threshold(),
            root_dir: self.config.root_dir.clone(),
            data_dir: self.config.data_dir.clone(),
            scan_dir: self.scan_dir().map(|dir| dir.display().to_string()),
            save_dir: self.config.save_dir.clone(),
            sample_name: self.config.sample_name.clone(),
            template_file: self.config.template_file.clone(),
            template_imagefile: self.config.template_imagefile.clone(),
            specfile: self.config.specfile.clone(),
        }
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}(unbinned_pixel_size={:?}, nb_pixel_x={}, nb_pixel_y={}, binning={:?},",
            self.model,
            self.unbinned_pixel_size(),
            self.nb_pixel_x(),
            self.nb_pixel_y(),
            self.binning(),
        )?;
        writeln!(
            f,
            " roi={:?}, sum_roi={:?}, preprocessing_binning={:?},",
            self.roi(),
            self.sum_roi(),
            self.preprocessing_binning(),
        )?;
        write!(
            f,
            " root_dir={:?}, data_dir={:?}, save_dir={:?}, sample_name={:?})",
            self.root_dir(),
            self.data_dir(),
            self.save_dir(),
            self.sample_name(),
        )
    }
}

/// All detector parameters in one serializable record.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorParams {
    pub name: String,
    pub unbinned_pixel_size_m: (f64, f64),
    pub nb_pixel_x: usize,
    pub nb_pixel_y: usize,
    pub binning: (usize, usize, usize),
    pub preprocessing_binning: (usize, usize, usize),
    pub roi: [usize; 4],
    pub sum_roi: [usize; 4],
    pub saturation_threshold: Option<f64>,
    pub root_dir: Option<String>,
    pub data_dir: Option<String>,
    pub scan_dir: Option<String>,
    pub save_dir: Option<String>,
    pub sample_name: Option<String>,
    pub template_file: Option<String>,
    pub template_imagefile: Option<String>,
    pub specfile: Option<String>,
}
