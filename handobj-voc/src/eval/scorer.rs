use super::*;
use crate::{
    common::*,
    dataset::{read_bincode, write_bincode},
};

/// How the precision/recall curve is integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApMetric {
    /// The VOC2007 11-point interpolated AP.
    Voc07ElevenPoint,
    /// The area under the precision envelope, used since VOC2010.
    Continuous,
}

impl ApMetric {
    /// The metric changed in 2010.
    pub fn for_year(year: u32) -> Self {
        if year < 2010 {
            Self::Voc07ElevenPoint
        } else {
            Self::Continuous
        }
    }

    pub fn integral_method(&self) -> IntegralMethod {
        match self {
            Self::Voc07ElevenPoint => IntegralMethod::Interpolation(11),
            Self::Continuous => IntegralMethod::Continuous,
        }
    }
}

/// Extra conditions a matched hand detection must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandConstraint {
    HandState,
    HandSide,
    ObjectBbox,
    All,
}

impl HandConstraint {
    /// All constraints in evaluation order.
    pub const ALL: [Self; 4] = [Self::HandState, Self::HandSide, Self::ObjectBbox, Self::All];

    pub fn name(&self) -> &'static str {
        match self {
            Self::HandState => "handstate",
            Self::HandSide => "handside",
            Self::ObjectBbox => "objectbbox",
            Self::All => "all",
        }
    }
}

impl fmt::Display for HandConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs to score one class.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    /// Where the per-class results files of the run are.
    pub results: ResultsTemplate,
    /// The directory of `<key>.xml` annotations.
    pub annotation_dir: PathBuf,
    pub image_set_file: PathBuf,
    pub class_name: String,
    /// Where the parsed annotations are cached.
    pub cache_dir: PathBuf,
    pub iou_threshold: f64,
    pub metric: ApMetric,
    pub use_diff: bool,
}

impl ScoreRequest {
    pub fn annotation_path(&self, key: &str) -> PathBuf {
        self.annotation_dir.join(format!("{}.xml", key))
    }

    /// The results file of the requested class.
    pub fn results_file(&self) -> PathBuf {
        self.results.path_for(&self.class_name)
    }
}

/// A precision/recall curve and its average precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCurve {
    pub rec: Vec<f64>,
    pub prec: Vec<f64>,
    pub ap: f64,
}

impl PrCurve {
    pub fn empty() -> Self {
        Self {
            rec: vec![],
            prec: vec![],
            ap: 0.0,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_bincode(path.as_ref(), self)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_bincode(path.as_ref())
    }
}

/// Computes per-class precision/recall curves from written results files.
pub trait ApScorer: Debug {
    fn voc_eval(&self, request: &ScoreRequest) -> Result<PrCurve>;

    fn voc_eval_hand(&self, request: &ScoreRequest, constraint: HandConstraint)
        -> Result<PrCurve>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_by_year() {
        assert_eq!(ApMetric::for_year(2007), ApMetric::Voc07ElevenPoint);
        assert_eq!(ApMetric::for_year(2009), ApMetric::Voc07ElevenPoint);
        assert_eq!(ApMetric::for_year(2010), ApMetric::Continuous);
        assert_eq!(ApMetric::for_year(2012), ApMetric::Continuous);
    }

    #[test]
    fn constraint_order() {
        let names: Vec<_> = HandConstraint::ALL.iter().map(|c| c.to_string()).collect();
        assert_eq!(names, ["handstate", "handside", "objectbbox", "all"]);
    }

    #[test]
    fn curve_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("hand_pr.pkl");
        let curve = PrCurve {
            rec: vec![0.5, 1.0],
            prec: vec![1.0, 0.5],
            ap: 0.75,
        };
        curve.save(&path).unwrap();
        assert_eq!(PrCurve::load(&path).unwrap(), curve);
    }
}
