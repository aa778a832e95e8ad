//! Acquisition-session configuration.
//!
//! [`DetectorBuilder`] collects the per-session settings (binning, regions of
//! interest, data locations, correction hooks) and validates all of them at
//! once in [`DetectorBuilder::build`]. The resulting [`Detector`] is
//! immutable: a change of configuration means building a new detector.

use serde::{Deserialize, Serialize};

use crate::detector::Detector;
use crate::model::{DetectorModel, DUMMY_PIXEL_NUMBER, DUMMY_PIXEL_SIZE};

/// Elementwise detector response correction.
///
/// The function receives the frame flattened in row-major order and must
/// return one sample per input sample; the contract is checked once when the
/// detector is built and again on the output length at every application.
pub type LinearityFn = Box<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Detector.{0}: all elements must be strictly positive integers")]
    NonPositiveBinning(&'static str),
    #[error("Detector.{0}: value must be strictly positive")]
    NonPositive(&'static str),
    #[error("Detector.{0}: string must not be empty")]
    EmptyString(&'static str),
    #[error("the linearity function must preserve the sample count, returned {actual} samples for {expected}")]
    LinearityContract { expected: usize, actual: usize },
}

fn default_binning() -> (usize, usize, usize) {
    (1, 1, 1)
}

/// Builder for a configured [`Detector`].
///
/// Settings can be chained programmatically or deserialized from JSON (the
/// linearity function, not being data, only exists on the programmatic path).
#[derive(Serialize, Deserialize)]
pub struct DetectorBuilder {
    model: DetectorModel,
    /// Binning of the phase-retrieval dataset
    /// (stacking dimension, detector vertical axis, detector horizontal axis).
    #[serde(default = "default_binning")]
    binning: (usize, usize, usize),
    /// Binning already applied by a previous preprocessing step.
    #[serde(default = "default_binning")]
    preprocessing_binning: (usize, usize, usize),
    /// Region of interest used for analysis, `[y_start, y_stop, x_start, x_stop]`.
    #[serde(default)]
    roi: Option<[usize; 4]>,
    /// Region of interest used for intensity integration.
    #[serde(default)]
    sum_roi: Option<[usize; 4]>,
    #[serde(default)]
    root_dir: Option<String>,
    #[serde(default)]
    data_dir: Option<String>,
    #[serde(default)]
    save_dir: Option<String>,
    #[serde(default)]
    sample_name: Option<String>,
    #[serde(default)]
    template_file: Option<String>,
    #[serde(default)]
    template_imagefile: Option<String>,
    #[serde(default)]
    specfile: Option<String>,
    /// Override of the model saturation threshold, counts per frame.
    #[serde(default)]
    saturation_threshold: Option<f64>,
    /// Pixel number (vertical, horizontal) of the Dummy detector.
    #[serde(default)]
    custom_pixel_number: Option<(usize, usize)>,
    /// Pixel size of the Dummy detector, in meters.
    #[serde(default)]
    custom_pixel_size: Option<f64>,
    #[serde(skip)]
    linearity_function: Option<LinearityFn>,
}

impl DetectorBuilder {
    pub fn new(model: DetectorModel) -> Self {
        Self {
            model,
            binning: default_binning(),
            preprocessing_binning: default_binning(),
            roi: None,
            sum_roi: None,
            root_dir: None,
            data_dir: None,
            save_dir: None,
            sample_name: None,
            template_file: None,
            template_imagefile: None,
            specfile: None,
            saturation_threshold: None,
            custom_pixel_number: None,
            custom_pixel_size: None,
            linearity_function: None,
        }
    }

    /// Detector factory: resolve a model name, then configure it.
    pub fn from_name(name: &str) -> Result<Self, crate::model::UnknownDetector> {
        Ok(Self::new(name.parse()?))
    }

    pub fn binning(self, binning: (usize, usize, usize)) -> Self {
        Self { binning, ..self }
    }

    pub fn preprocessing_binning(self, preprocessing_binning: (usize, usize, usize)) -> Self {
        Self {
            preprocessing_binning,
            ..self
        }
    }

    /// `[y_start, y_stop, x_start, x_stop]`; left unset, the ROI defaults to
    /// the full frame after preprocessing binning. Range ordering is the
    /// caller's responsibility.
    pub fn roi(self, roi: [usize; 4]) -> Self {
        Self {
            roi: Some(roi),
            ..self
        }
    }

    /// `[y_start, y_stop, x_start, x_stop]`; left unset, defaults to the
    /// analysis ROI.
    pub fn sum_roi(self, sum_roi: [usize; 4]) -> Self {
        Self {
            sum_roi: Some(sum_roi),
            ..self
        }
    }

    pub fn root_dir(self, root_dir: impl Into<String>) -> Self {
        Self {
            root_dir: Some(root_dir.into()),
            ..self
        }
    }

    pub fn data_dir(self, data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..self
        }
    }

    pub fn save_dir(self, save_dir: impl Into<String>) -> Self {
        Self {
            save_dir: Some(save_dir.into()),
            ..self
        }
    }

    pub fn sample_name(self, sample_name: impl Into<String>) -> Self {
        Self {
            sample_name: Some(sample_name.into()),
            ..self
        }
    }

    pub fn template_file(self, template_file: impl Into<String>) -> Self {
        Self {
            template_file: Some(template_file.into()),
            ..self
        }
    }

    pub fn template_imagefile(self, template_imagefile: impl Into<String>) -> Self {
        Self {
            template_imagefile: Some(template_imagefile.into()),
            ..self
        }
    }

    pub fn specfile(self, specfile: impl Into<String>) -> Self {
        Self {
            specfile: Some(specfile.into()),
            ..self
        }
    }

    pub fn saturation_threshold(self, saturation_threshold: f64) -> Self {
        Self {
            saturation_threshold: Some(saturation_threshold),
            ..self
        }
    }

    /// Pixel number (vertical, horizontal) override for the Dummy detector.
    pub fn custom_pixel_number(self, custom_pixel_number: (usize, usize)) -> Self {
        Self {
            custom_pixel_number: Some(custom_pixel_number),
            ..self
        }
    }

    /// Pixel size override for the Dummy detector, in meters.
    pub fn custom_pixel_size(self, custom_pixel_size: f64) -> Self {
        Self {
            custom_pixel_size: Some(custom_pixel_size),
            ..self
        }
    }

    /// Correction for a non-linear detector response at large intensities.
    pub fn linearity_function(
        self,
        f: impl Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            linearity_function: Some(Box::new(f)),
            ..self
        }
    }

    /// Validate every setting and assemble the detector.
    pub fn build(self) -> Result<Detector, ConfigError> {
        let Self {
            model,
            binning,
            preprocessing_binning,
            roi,
            sum_roi,
            root_dir,
            data_dir,
            save_dir,
            sample_name,
            template_file,
            template_imagefile,
            specfile,
            saturation_threshold,
            custom_pixel_number,
            custom_pixel_size,
            linearity_function,
        } = self;

        check_binning(binning, "binning")?;
        check_binning(preprocessing_binning, "preprocessing_binning")?;
        check_string(&root_dir, "root_dir")?;
        check_string(&data_dir, "data_dir")?;
        check_string(&save_dir, "save_dir")?;
        check_string(&sample_name, "sample_name")?;
        check_string(&template_file, "template_file")?;
        check_string(&template_imagefile, "template_imagefile")?;
        check_string(&specfile, "specfile")?;
        if let Some(threshold) = saturation_threshold {
            if !(threshold > 0.) {
                return Err(ConfigError::NonPositive("saturation_threshold"));
            }
        }
        if let Some(size) = custom_pixel_size {
            if !(size > 0.) {
                return Err(ConfigError::NonPositive("custom_pixel_size"));
            }
        }
        if let Some((v, h)) = custom_pixel_number {
            if v == 0 || h == 0 {
                return Err(ConfigError::NonPositive("custom_pixel_number"));
            }
        }
        if let Some(f) = &linearity_function {
            let probe = [0f64; 4];
            let out = f(&probe);
            if out.len() != probe.len() {
                return Err(ConfigError::LinearityContract {
                    expected: probe.len(),
                    actual: out.len(),
                });
            }
        }

        let unbinned_pixel_number = match model {
            DetectorModel::Dummy => custom_pixel_number.unwrap_or_else(|| {
                log::warn!("defaulting the pixel number to {:?}", DUMMY_PIXEL_NUMBER);
                DUMMY_PIXEL_NUMBER
            }),
            _ => {
                if custom_pixel_number.is_some() {
                    log::warn!("custom_pixel_number only applies to the Dummy detector, ignored");
                }
                model.unbinned_pixel_number()
            }
        };
        let unbinned_pixel_size = match model {
            DetectorModel::Dummy => custom_pixel_size.map(|size| (size, size)).unwrap_or_else(|| {
                log::warn!(
                    "defaulting the pixel size to {:?}m",
                    (DUMMY_PIXEL_SIZE, DUMMY_PIXEL_SIZE)
                );
                (DUMMY_PIXEL_SIZE, DUMMY_PIXEL_SIZE)
            }),
            _ => {
                if custom_pixel_size.is_some() {
                    log::warn!("custom_pixel_size only applies to the Dummy detector, ignored");
                }
                model.unbinned_pixel_size()
            }
        };

        // the default regions of interest span the frame left by a previous
        // preprocessing binning, so the pixel counts come first
        let nb_pixel_y = unbinned_pixel_number.0 / preprocessing_binning.1;
        let nb_pixel_x = unbinned_pixel_number.1 / preprocessing_binning.2;
        let roi = roi.unwrap_or([0, nb_pixel_y, 0, nb_pixel_x]);
        let sum_roi = sum_roi.unwrap_or(roi);

        Ok(Detector {
            model,
            config: DetectorConfig {
                binning,
                preprocessing_binning,
                unbinned_pixel_number,
                unbinned_pixel_size,
                roi,
                sum_roi,
                root_dir,
                data_dir,
                save_dir,
                sample_name,
                template_file,
                template_imagefile,
                specfile,
                saturation_threshold: saturation_threshold.or(model.saturation_threshold()),
                linearity_function,
            },
        })
    }
}

fn check_binning(value: (usize, usize, usize), field: &'static str) -> Result<(), ConfigError> {
    if value.0 == 0 || value.1 == 0 || value.2 == 0 {
        return Err(ConfigError::NonPositiveBinning(field));
    }
    Ok(())
}

fn check_string(value: &Option<String>, field: &'static str) -> Result<(), ConfigError> {
    match value {
        Some(s) if s.is_empty() => Err(ConfigError::EmptyString(field)),
        _ => Ok(()),
    }
}

/// Validated per-session settings, one per acquisition.
///
/// Only built through [`DetectorBuilder`]; the derived quantities
/// ([`Detector::nb_pixel_x`](crate::Detector::nb_pixel_x),
/// [`Detector::pixel_size_y`](crate::Detector::pixel_size_y), ...) are always
/// recomputed from these fields.
pub struct DetectorConfig {
    pub(crate) binning: (usize, usize, usize),
    pub(crate) preprocessing_binning: (usize, usize, usize),
    pub(crate) unbinned_pixel_number: (usize, usize),
    pub(crate) unbinned_pixel_size: (f64, f64),
    pub(crate) roi: [usize; 4],
    pub(crate) sum_roi: [usize; 4],
    pub(crate) root_dir: Option<String>,
    pub(crate) data_dir: Option<String>,
    pub(crate) save_dir: Option<String>,
    pub(crate) sample_name: Option<String>,
    pub(crate) template_file: Option<String>,
    pub(crate) template_imagefile: Option<String>,
    pub(crate) specfile: Option<String>,
    pub(crate) saturation_threshold: Option<f64>,
    pub(crate) linearity_function: Option<LinearityFn>,
}

impl std::fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("binning", &self.binning)
            .field("preprocessing_binning", &self.preprocessing_binning)
            .field("unbinned_pixel_number", &self.unbinned_pixel_number)
            .field("unbinned_pixel_size", &self.unbinned_pixel_size)
            .field("roi", &self.roi)
            .field("sum_roi", &self.sum_roi)
            .field("root_dir", &self.root_dir)
            .field("data_dir", &self.data_dir)
            .field("save_dir", &self.save_dir)
            .field("sample_name", &self.sample_name)
            .field("template_file", &self.template_file)
            .field("template_imagefile", &self.template_imagefile)
            .field("specfile", &self.specfile)
            .field("saturation_threshold", &self.saturation_threshold)
            .field(
                "linearity_function",
                &self.linearity_function.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}
