use crate::{config::ConfigError, corrections::CorrectionError, model::UnknownDetector};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `config` module")]
    Config(#[from] ConfigError),
    #[error("Error in the `corrections` module")]
    Correction(#[from] CorrectionError),
    #[error("Error in the `model` module")]
    UnknownDetector(#[from] UnknownDetector),
}
