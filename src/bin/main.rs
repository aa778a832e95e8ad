//! Apply the detector corrections to a raw diffraction frame.
//!
//! The frame and the optional correction arrays are 2D `.npy` files; the
//! corrected frame and the updated mask are written back as `.npy`.

use std::{
    error::Error,
    fs, io,
    path::{Path, PathBuf},
};

use bcdi_detector::{Corrections, DetectorBuilder, DetectorModel};
use ndarray::Array2;
use npyz::WriterBuilder;
use structopt::StructOpt;
use strum::IntoEnumIterator;

#[derive(Debug, StructOpt)]
#[structopt(name = "bcdi-detector", about = "2D detector corrections for BCDI frames")]
struct Opt {
    /// Detector name, e.g. Maxipix (see --list)
    detector: Option<String>,
    /// Path to the raw frame, a 2D `.npy` file
    frame: Option<PathBuf>,
    /// Path to the exclusion mask (`.npy`, u8), all zeros when omitted
    #[structopt(short, long)]
    mask: Option<PathBuf>,
    /// Flatfield map (`.npy`, f64)
    #[structopt(long)]
    flatfield: Option<PathBuf>,
    /// Background frame (`.npy`, f64)
    #[structopt(long)]
    background: Option<PathBuf>,
    /// Hot pixel map (`.npy`, u8)
    #[structopt(long)]
    hot_pixels: Option<PathBuf>,
    /// Number of raw exposures summed into the frame
    #[structopt(short = "n", long, default_value = "1")]
    frames: usize,
    /// Detector configuration JSON file, replaces the detector name argument
    #[structopt(short, long)]
    config: Option<PathBuf>,
    /// Directory where the corrected frame and mask are written
    #[structopt(short, long, default_value = ".")]
    output: PathBuf,
    /// List the supported detectors
    #[structopt(long)]
    list: bool,
    /// Print the detector parameters as JSON and exit
    #[structopt(long)]
    params: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let opt = Opt::from_args();

    if opt.list {
        for model in DetectorModel::iter() {
            println!("{}", model);
        }
        return Ok(());
    }

    let builder: DetectorBuilder = match (&opt.config, &opt.detector) {
        (Some(path), _) => serde_json::from_reader(fs::File::open(path)?)?,
        (None, Some(name)) => DetectorBuilder::from_name(name)?,
        (None, None) => return Err("a detector name or --config is required".into()),
    };
    let detector = builder.build()?;

    if opt.params {
        println!("{}", serde_json::to_string_pretty(&detector.params())?);
        return Ok(());
    }

    let frame = opt.frame.as_deref().ok_or("missing the frame file")?;
    log::info!("Loading {:?}...", frame);
    let mut data = read_2d::<f64>(frame)?;
    let mut mask = match &opt.mask {
        Some(path) => read_2d::<u8>(path)?,
        None => Array2::zeros(data.dim()),
    };
    let flatfield = opt.flatfield.as_deref().map(read_2d::<f64>).transpose()?;
    let background = opt.background.as_deref().map(read_2d::<f64>).transpose()?;
    let hot_pixels = opt.hot_pixels.as_deref().map(read_2d::<u8>).transpose()?;

    detector.mask_detector(
        &mut data,
        &mut mask,
        Corrections {
            nb_frames: opt.frames,
            flatfield: flatfield.as_ref(),
            background: background.as_ref(),
            hot_pixels: hot_pixels.as_ref(),
        },
    )?;
    log::info!(
        "{} pixels masked out of {}",
        mask.iter().filter(|&&m| m == 1).count(),
        mask.len()
    );

    fs::create_dir_all(&opt.output)?;
    write_2d(&opt.output.join("corrected.npy"), &data)?;
    write_2d(&opt.output.join("mask.npy"), &mask)?;
    log::info!("Corrected frame saved to {:?}", opt.output);
    println!("{}", detector);
    Ok(())
}

fn read_2d<T: npyz::Deserialize>(path: &Path) -> Result<Array2<T>, Box<dyn Error>> {
    let bytes = fs::read(path)?;
    let npy = npyz::NpyFile::new(&bytes[..])?;
    let shape = npy.shape().to_vec();
    if shape.len() != 2 {
        return Err(format!(
            "{}: expected a 2D array, got {} dimension(s)",
            path.display(),
            shape.len()
        )
        .into());
    }
    let (nrows, ncols) = (shape[0] as usize, shape[1] as usize);
    Ok(Array2::from_shape_vec((nrows, ncols), npy.into_vec()?)?)
}

fn write_2d<T: npyz::AutoSerialize>(path: &Path, array: &Array2<T>) -> Result<(), Box<dyn Error>> {
    let mut file = io::BufWriter::new(fs::File::create(path)?);
    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(&[array.nrows() as u64, array.ncols() as u64])
        .writer(&mut file)
        .begin_nd()?;
    for value in array.iter() {
        writer.push(value)?;
    }
    writer.finish()?;
    Ok(())
}
