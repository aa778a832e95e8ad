//! Per-frame correction pipeline.
//!
//! [`Detector::mask_detector`] applies the corrections in a fixed order:
//! linearity, flatfield, background, hot pixels, sensor gaps, saturation.
//! The first three rescale the data, the last three also update the mask.
//! Corrections are applied in place; a failing step leaves the corrections of
//! the previous steps in the frame.

use ndarray::{s, Array2, Zip};

use crate::config::LinearityFn;
use crate::detector::Detector;

#[derive(thiserror::Error, Debug)]
pub enum CorrectionError {
    #[error("{name} shape {actual:?} does not match the frame shape {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("the hot pixel map must contain only 0 and 1, found {value} at {at:?}")]
    NotBinary { value: u8, at: (usize, usize) },
    #[error("nb_frames must be a strictly positive integer")]
    FrameCount,
    #[error("the linearity function returned {actual} samples for {expected}")]
    LinearityContract { expected: usize, actual: usize },
}

/// Optional per-acquisition correction inputs of [`Detector::mask_detector`].
///
/// Every provided array must have the exact shape of the frame.
pub struct Corrections<'a> {
    /// Number of raw exposures summed into the frame, scales the saturation
    /// threshold.
    pub nb_frames: usize,
    /// Per-pixel multiplicative sensitivity map.
    pub flatfield: Option<&'a Array2<f64>>,
    /// Frame to subtract from the data.
    pub background: Option<&'a Array2<f64>>,
    /// Map of pixels to mask unconditionally, 1 = hot pixel.
    pub hot_pixels: Option<&'a Array2<u8>>,
}

impl Default for Corrections<'_> {
    fn default() -> Self {
        Self {
            nb_frames: 1,
            flatfield: None,
            background: None,
            hot_pixels: None,
        }
    }
}

impl Detector {
    /// Correct and mask a frame measured with this detector.
    ///
    /// `data` is the 2D frame (or sum of `nb_frames` raw frames), `mask` the
    /// running exclusion mask of the same shape (1 = excluded pixel). Both
    /// are updated in place. Out-of-range values (saturation, hot pixels,
    /// gaps) are corrected, not reported: only contract violations fail.
    pub fn mask_detector(
        &self,
        data: &mut Array2<f64>,
        mask: &mut Array2<u8>,
        corrections: Corrections<'_>,
    ) -> Result<(), CorrectionError> {
        let shape = data.dim();
        check_shape("mask", shape, mask.dim())?;
        if corrections.nb_frames == 0 {
            return Err(CorrectionError::FrameCount);
        }

        if let Some(f) = &self.config.linearity_function {
            apply_linearity(f, data)?;
        }
        if let Some(flatfield) = corrections.flatfield {
            check_shape("flatfield", shape, flatfield.dim())?;
            data.zip_mut_with(flatfield, |d, &f| *d *= f);
        }
        if let Some(background) = corrections.background {
            check_shape("background", shape, background.dim())?;
            data.zip_mut_with(background, |d, &b| *d -= b);
        }
        if let Some(hot_pixels) = corrections.hot_pixels {
            check_shape("hot_pixels", shape, hot_pixels.dim())?;
            mask_hot_pixels(data, mask, hot_pixels)?;
        }
        self.mask_gaps(data, mask);
        if let Some(threshold) = self.config.saturation_threshold {
            clip_saturated(threshold * corrections.nb_frames as f64, data, mask);
        }
        Ok(())
    }

    /// Zero the data and raise the mask over the sensor gaps of the model.
    ///
    /// Gap tables address the unbinned un-cropped frame; regions overflowing
    /// a smaller frame are clamped. Idempotent.
    fn mask_gaps(&self, data: &mut Array2<f64>, mask: &mut Array2<u8>) {
        let (nrows, ncols) = data.dim();
        for region in self.model.gap_regions() {
            let (r0, r1) = region.rows.resolve(nrows);
            let (c0, c1) = region.cols.resolve(ncols);
            if r0 >= r1 || c0 >= c1 {
                continue;
            }
            data.slice_mut(s![r0..r1, c0..c1]).fill(0.);
            mask.slice_mut(s![r0..r1, c0..c1]).fill(1);
        }
    }
}

fn check_shape(
    name: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<(), CorrectionError> {
    if expected != actual {
        return Err(CorrectionError::ShapeMismatch {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Run the configured response correction over the flattened frame.
fn apply_linearity(f: &LinearityFn, data: &mut Array2<f64>) -> Result<(), CorrectionError> {
    let dim = data.dim();
    let flat: Vec<f64> = data.iter().copied().collect();
    let corrected = f(&flat);
    if corrected.len() != flat.len() {
        return Err(CorrectionError::LinearityContract {
            expected: flat.len(),
            actual: corrected.len(),
        });
    }
    *data = Array2::from_shape_vec(dim, corrected).map_err(|_| {
        CorrectionError::LinearityContract {
            expected: dim.0 * dim.1,
            actual: 0,
        }
    })?;
    Ok(())
}

/// Zero and mask the pixels flagged in the hot pixel map.
fn mask_hot_pixels(
    data: &mut Array2<f64>,
    mask: &mut Array2<u8>,
    hot_pixels: &Array2<u8>,
) -> Result<(), CorrectionError> {
    for ((y, x), &value) in hot_pixels.indexed_iter() {
        if value > 1 {
            return Err(CorrectionError::NotBinary { value, at: (y, x) });
        }
    }
    Zip::from(data)
        .and(mask)
        .and(hot_pixels)
        .for_each(|d, m, &hot| {
            if hot == 1 {
                *d = 0.;
                *m = 1;
            }
        });
    Ok(())
}

/// Zero and mask the pixels above the summed-frame saturation ceiling.
fn clip_saturated(ceiling: f64, data: &mut Array2<f64>, mask: &mut Array2<u8>) {
    Zip::from(data).and(mask).for_each(|d, m| {
        if *d > ceiling {
            *d = 0.;
            *m = 1;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DetectorModel;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn detector(model: DetectorModel) -> Detector {
        Detector::builder(model).build().unwrap()
    }

    fn frame(shape: (usize, usize), value: f64) -> (Array2<f64>, Array2<u8>) {
        (Array2::from_elem(shape, value), Array2::zeros(shape))
    }

    #[test]
    fn mask_shape_is_checked_first() {
        let det = detector(DetectorModel::Timepix);
        let mut data = Array2::zeros((256, 256));
        let mut mask = Array2::zeros((256, 255));
        let err = det
            .mask_detector(&mut data, &mut mask, Corrections::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CorrectionError::ShapeMismatch { name: "mask", .. }
        ));
    }

    #[test]
    fn nb_frames_must_be_positive() {
        let det = detector(DetectorModel::Timepix);
        let (mut data, mut mask) = frame((256, 256), 0.);
        let err = det
            .mask_detector(
                &mut data,
                &mut mask,
                Corrections {
                    nb_frames: 0,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CorrectionError::FrameCount));
    }

    #[test]
    fn flatfield_multiplies_elementwise() {
        let det = detector(DetectorModel::Timepix);
        let (mut data, mut mask) = frame((256, 256), 3.);
        let flatfield = Array2::from_elem((256, 256), 1.5);
        det.mask_detector(
            &mut data,
            &mut mask,
            Corrections {
                flatfield: Some(&flatfield),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(data[[17, 211]], 4.5);
        assert_eq!(mask.sum(), 0);
    }

    #[test]
    fn background_subtracts_elementwise() {
        let det = detector(DetectorModel::Timepix);
        let (mut data, mut mask) = frame((256, 256), 10.);
        let background = Array2::from_elem((256, 256), 4.);
        det.mask_detector(
            &mut data,
            &mut mask,
            Corrections {
                background: Some(&background),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(data[[0, 0]], 6.);
    }

    #[test]
    fn flatfield_shape_mismatch_leaves_data_untouched() {
        let det = detector(DetectorModel::Timepix);
        let (mut data, mut mask) = frame((256, 256), 7.);
        let flatfield = Array2::from_elem((128, 256), 2.);
        let err = det
            .mask_detector(
                &mut data,
                &mut mask,
                Corrections {
                    flatfield: Some(&flatfield),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CorrectionError::ShapeMismatch {
                name: "flatfield",
                expected: (256, 256),
                actual: (128, 256),
            }
        ));
        assert!(data.iter().all(|&d| d == 7.));
    }

    #[test]
    fn hot_pixel_map_must_be_binary() {
        let det = detector(DetectorModel::Timepix);
        let (mut data, mut mask) = frame((256, 256), 0.);
        let mut hot_pixels = Array2::zeros((256, 256));
        hot_pixels[[12, 34]] = 3;
        let err = det
            .mask_detector(
                &mut data,
                &mut mask,
                Corrections {
                    hot_pixels: Some(&hot_pixels),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CorrectionError::NotBinary {
                value: 3,
                at: (12, 34)
            }
        ));
    }

    #[test]
    fn gap_masking_is_idempotent() {
        let det = detector(DetectorModel::Maxipix);
        let (mut data, mut mask) = frame((516, 516), 1.);
        det.mask_detector(&mut data, &mut mask, Corrections::default())
            .unwrap();
        let (data_once, mask_once) = (data.clone(), mask.clone());
        det.mask_detector(&mut data, &mut mask, Corrections::default())
            .unwrap();
        assert_eq!(data, data_once);
        assert_eq!(mask, mask_once);
    }

    #[test]
    fn saturation_is_a_no_op_below_threshold() {
        let det = detector(DetectorModel::Merlin);
        let mut rng = StdRng::seed_from_u64(42);
        let mut data = Array2::from_shape_simple_fn((515, 515), || rng.gen_range(0.0..1e5));
        let mut mask = Array2::zeros((515, 515));
        let before = data.clone();
        det.mask_detector(
            &mut data,
            &mut mask,
            Corrections {
                nb_frames: 2,
                ..Default::default()
            },
        )
        .unwrap();
        // only the chip gaps changed anything
        for ((y, x), &value) in before.indexed_iter() {
            let in_gap = (255..260).contains(&y) || (255..260).contains(&x);
            assert_eq!(data[[y, x]], if in_gap { 0. } else { value });
            assert_eq!(mask[[y, x]], u8::from(in_gap));
        }
    }

    #[test]
    fn saturation_clips_only_the_offending_pixel() {
        // Timepix has no threshold of its own, configure one
        let det = Detector::builder(DetectorModel::Timepix)
            .saturation_threshold(1e6)
            .build()
            .unwrap();
        let (mut data, mut mask) = frame((256, 256), 10.);
        data[[40, 50]] = 3e6;
        det.mask_detector(
            &mut data,
            &mut mask,
            Corrections {
                nb_frames: 2,
                ..Default::default()
            },
        )
        .unwrap();
        // 3e6 > 1e6 x 2 frames
        assert_eq!(data[[40, 50]], 0.);
        assert_eq!(mask[[40, 50]], 1);
        assert_eq!(mask.sum() as usize, 1);
        assert_eq!(data.sum(), 10. * (256. * 256. - 1.));
    }

    #[test]
    fn summed_frames_raise_the_ceiling() {
        let det = detector(DetectorModel::Maxipix);
        let (mut data, mut mask) = frame((516, 516), 0.);
        data[[10, 10]] = 1.5e6;
        det.mask_detector(
            &mut data,
            &mut mask,
            Corrections {
                nb_frames: 2,
                ..Default::default()
            },
        )
        .unwrap();
        // 1.5e6 < 1e6 x 2, the pixel survives
        assert_eq!(data[[10, 10]], 1.5e6);
        assert_eq!(mask[[10, 10]], 0);
    }

    #[test]
    fn linearity_function_runs_first() {
        let det = Detector::builder(DetectorModel::Timepix)
            .linearity_function(|data| data.iter().map(|&d| 2. * d).collect())
            .build()
            .unwrap();
        let (mut data, mut mask) = frame((256, 256), 3.);
        let background = Array2::from_elem((256, 256), 1.);
        det.mask_detector(
            &mut data,
            &mut mask,
            Corrections {
                background: Some(&background),
                ..Default::default()
            },
        )
        .unwrap();
        // (3 x 2) - 1, not (3 - 1) x 2
        assert_eq!(data[[100, 100]], 5.);
    }

    #[test]
    fn length_changing_linearity_fails_at_application() {
        // preserves the 4-sample probe but not a real frame
        let det = Detector::builder(DetectorModel::Timepix)
            .linearity_function(|data| vec![0.; data.len().min(4)])
            .build()
            .unwrap();
        let (mut data, mut mask) = frame((256, 256), 1.);
        let err = det
            .mask_detector(&mut data, &mut mask, Corrections::default())
            .unwrap_err();
        assert!(matches!(err, CorrectionError::LinearityContract { .. }));
    }

    #[test]
    fn maxipix_hot_pixel_scenario() {
        let det = detector(DetectorModel::Maxipix);
        let (mut data, mut mask) = frame((516, 516), 0.);
        data[[100, 100]] = 5.;
        let mut hot_pixels = Array2::zeros((516, 516));
        hot_pixels[[100, 100]] = 1;
        det.mask_detector(
            &mut data,
            &mut mask,
            Corrections {
                hot_pixels: Some(&hot_pixels),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(data[[100, 100]], 0.);
        assert_eq!(mask[[100, 100]], 1);
        for ((y, x), &m) in mask.indexed_iter() {
            let in_gap = (255..261).contains(&y) || (255..261).contains(&x);
            let expected = in_gap || (y, x) == (100, 100);
            assert_eq!(m, u8::from(expected), "mask mismatch at ({y}, {x})");
            assert_eq!(data[[y, x]], 0.);
        }
    }

    #[test]
    fn eiger4m_saturated_border_scenario() {
        let det = detector(DetectorModel::Eiger4M);
        let (mut data, mut mask) = frame((2167, 2070), 100.);
        data.row_mut(0).fill(5e9);
        data.row_mut(2166).fill(5e9);
        data.column_mut(0).fill(5e9);
        data.column_mut(2069).fill(5e9);
        det.mask_detector(&mut data, &mut mask, Corrections::default())
            .unwrap();
        for x in 0..2070 {
            assert_eq!(data[[0, x]], 0.);
            assert_eq!(mask[[0, x]], 1);
            assert_eq!(data[[2166, x]], 0.);
            assert_eq!(mask[[2166, x]], 1);
        }
        for y in 0..2167 {
            assert_eq!(data[[y, 0]], 0.);
            assert_eq!(mask[[y, 0]], 1);
            assert_eq!(data[[y, 2069]], 0.);
            assert_eq!(mask[[y, 2069]], 1);
        }
        // an interior pixel away from the seams is untouched
        assert_eq!(data[[1000, 100]], 100.);
        assert_eq!(mask[[1000, 100]], 0);
    }

    #[test]
    fn gapless_models_pass_frames_through() {
        let det = detector(DetectorModel::Dummy);
        let (mut data, mut mask) = frame((516, 516), 2.);
        det.mask_detector(&mut data, &mut mask, Corrections::default())
            .unwrap();
        assert!(data.iter().all(|&d| d == 2.));
        assert_eq!(mask.sum(), 0);
    }
}
