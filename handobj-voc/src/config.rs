//! Dataset and evaluation configuration format.

use crate::common::*;

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: PascalVocConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }
}

/// PASCAL VOC dataset options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PascalVocConfig {
    /// Dataset year, e.g. `"2007"`.
    pub year: String,
    /// Split name: `train`, `val`, `trainval` or `test`.
    pub image_set: String,
    /// The root of all data files.
    pub data_dir: PathBuf,
    /// The VOC devkit. Defaults to `<data_dir>/VOCdevkit<year>_handobj_100K`.
    #[serde(default)]
    pub devkit_path: Option<PathBuf>,
    /// The directory to save roidb caches.
    pub cache_dir: PathBuf,
    /// Remove results files after evaluation.
    #[serde(default = "default_true")]
    pub cleanup: bool,
    /// Append a random salt to the run identifier.
    #[serde(default = "default_true")]
    pub use_salt: bool,
    /// Count difficult objects in the scoring.
    #[serde(default)]
    pub use_diff: bool,
    /// Cross-check scores with the MATLAB devkit code.
    #[serde(default)]
    pub matlab_eval: bool,
    /// Proposal file consumed by the RPN roidb source.
    #[serde(default)]
    pub rpn_file: Option<PathBuf>,
    /// Minimum side length of kept selective search proposals.
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    #[serde(default)]
    pub matlab: Option<MatlabConfig>,
}

/// Location of the MATLAB executable and the devkit wrapper scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatlabConfig {
    pub command: PathBuf,
    pub wrapper_dir: PathBuf,
}

impl PascalVocConfig {
    pub fn new(
        year: impl Into<String>,
        image_set: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            year: year.into(),
            image_set: image_set.into(),
            data_dir: data_dir.into(),
            devkit_path: None,
            cache_dir: cache_dir.into(),
            cleanup: true,
            use_salt: true,
            use_diff: false,
            matlab_eval: false,
            rpn_file: None,
            min_size: default_min_size(),
            matlab: None,
        }
    }

    pub fn devkit_path(&self) -> PathBuf {
        match &self.devkit_path {
            Some(path) => path.clone(),
            None => self
                .data_dir
                .join(format!("VOCdevkit{}_handobj_100K", self.year)),
        }
    }

    /// `<devkit>/VOC<year>`
    pub fn data_path(&self) -> PathBuf {
        self.devkit_path().join(format!("VOC{}", self.year))
    }

    pub fn year_number(&self) -> Result<u32> {
        self.year
            .trim()
            .parse()
            .with_context(|| format!("invalid dataset year '{}'", self.year))
    }

    /// Official submission runs use stable file names and keep the results files.
    pub fn competition_mode(&mut self, on: bool) {
        self.use_salt = !on;
        self.cleanup = !on;
    }
}

fn default_true() -> bool {
    true
}

fn default_min_size() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let text = r#"{
            dataset: {
                year: "2007",
                image_set: "test",
                data_dir: "data",
                cache_dir: "data/cache",
            },
        }"#;
        let config: Config = json5::from_str(text).unwrap();
        let dataset = config.dataset;

        assert!(dataset.cleanup);
        assert!(dataset.use_salt);
        assert!(!dataset.use_diff);
        assert!(!dataset.matlab_eval);
        assert_eq!(dataset.min_size, 2);
        assert_eq!(
            dataset.devkit_path(),
            Path::new("data/VOCdevkit2007_handobj_100K")
        );
        assert_eq!(
            dataset.data_path(),
            Path::new("data/VOCdevkit2007_handobj_100K/VOC2007")
        );
        assert_eq!(dataset.year_number().unwrap(), 2007);
    }

    #[test]
    fn competition_mode_toggle() {
        let mut config = PascalVocConfig::new("2007", "test", "data", "cache");
        config.competition_mode(true);
        assert!(!config.use_salt);
        assert!(!config.cleanup);
        config.competition_mode(false);
        assert!(config.use_salt);
        assert!(config.cleanup);
    }
}
