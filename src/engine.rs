use crate::{
    error::Error,
    preprocess::{InputSpec, InputTensor},
};
use ndarray::ArrayD;
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// MoveNet single-pose variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModelVariant {
    /// Faster, less accurate.
    Lightning,
    /// Slower, more accurate.
    Thunder,
}

impl ModelVariant {
    pub fn input_size(self) -> usize {
        match self {
            Self::Lightning => 192,
            Self::Thunder => 256,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Lightning => "movenet_singlepose_lightning.tflite",
            Self::Thunder => "movenet_singlepose_thunder.tflite",
        }
    }
}

impl Default for ModelVariant {
    fn default() -> Self {
        Self::Thunder
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lightning" => Ok(Self::Lightning),
            "thunder" => Ok(Self::Thunder),
            _ => Err(Error::ParseModelVariant(s.to_owned())),
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lightning => "lightning",
            Self::Thunder => "thunder",
        })
    }
}

/// Where inference runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Backend {
    Cpu,
    EdgeTpu,
}

impl Default for Backend {
    fn default() -> Self {
        Self::Cpu
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "edgetpu" | "tpu" => Ok(Self::EdgeTpu),
            _ => Err(Error::ParseBackend(s.to_owned())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::EdgeTpu => "edgetpu",
        })
    }
}

/// Everything that requires a fresh engine when it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub model_dir: PathBuf,
    pub variant: ModelVariant,
    pub threads: u8,
    pub backend: Backend,
}

impl EngineConfig {
    pub const MAX_THREADS: u8 = 8;

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(self.variant.file_name())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.threads == 0 || self.threads > Self::MAX_THREADS {
            return Err(Error::InvalidThreadCount {
                got: self.threads,
                max: Self::MAX_THREADS,
            });
        }
        Ok(())
    }

    /// The model file, if it exists.
    pub fn existing_model_path(&self) -> Result<PathBuf, Error> {
        let path = self.model_path();
        if Path::new(&path).is_file() {
            Ok(path)
        } else {
            Err(Error::ModelNotFound(path))
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            variant: ModelVariant::default(),
            threads: 4,
            backend: Backend::default(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Timing {
    pub preprocess: Duration,
    pub inference: Duration,
    pub decode: Duration,
}

impl Timing {
    pub fn total(&self) -> Duration {
        self.preprocess + self.inference + self.decode
    }
}

/// A keypoint detector with a fixed tensor contract.
///
/// Input is `[1, S, S, 3]` as declared by [`InferenceEngine::input_spec`];
/// output holds one `(y, x, confidence)` row per joint. Calls are never
/// concurrent.
pub trait InferenceEngine: Send {
    fn input_spec(&self) -> InputSpec;

    fn infer(&mut self, input: &InputTensor) -> Result<ArrayD<f32>, Error>;
}

impl<E> InferenceEngine for Box<E>
where
    E: InferenceEngine + ?Sized,
{
    fn input_spec(&self) -> InputSpec {
        (**self).input_spec()
    }

    fn infer(&mut self, input: &InputTensor) -> Result<ArrayD<f32>, Error> {
        (**self).infer(input)
    }
}

/// Builds engines for a configuration.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: InferenceEngine + 'static;

    fn build(&self, config: &EngineConfig) -> Result<Self::Engine, Error>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(&EngineConfig) -> Result<E, Error> + Send + Sync + 'static,
    E: InferenceEngine + 'static,
{
    type Engine = E;

    fn build(&self, config: &EngineConfig) -> Result<Self::Engine, Error> {
        self(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_select_model_files() {
        let config = EngineConfig {
            model_dir: PathBuf::from("/opt/models"),
            variant: ModelVariant::Lightning,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.model_path(),
            PathBuf::from("/opt/models/movenet_singlepose_lightning.tflite")
        );
        assert_eq!(ModelVariant::Lightning.input_size(), 192);
        assert_eq!(ModelVariant::Thunder.input_size(), 256);
    }

    #[test]
    fn thread_count_is_bounded() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());
        config.threads = 0;
        assert!(config.validate().is_err());
        config.threads = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_model_is_reported() {
        let config = EngineConfig {
            model_dir: PathBuf::from("/nonexistent"),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.existing_model_path(),
            Err(Error::ModelNotFound(_))
        ));
    }

    #[test]
    fn parses_cli_values() {
        assert_eq!("Thunder".parse::<ModelVariant>().unwrap(), ModelVariant::Thunder);
        assert_eq!("edgetpu".parse::<Backend>().unwrap(), Backend::EdgeTpu);
        assert!("gpu".parse::<Backend>().is_err());
    }
}
