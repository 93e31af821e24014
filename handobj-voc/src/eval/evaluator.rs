use super::*;
use crate::{
    common::*,
    config::PascalVocConfig,
    dataset::{ImageIndex, BACKGROUND_CLASS, HAND_CLASS},
};

/// IoU a detection must exceed to match a ground truth box.
pub const IOU_THRESHOLD: f64 = 0.5;

/// How the MATLAB cross-check went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatlabStatus {
    /// MATLAB ran and exited with the code, if any.
    Exited { success: bool, code: Option<i32> },
    /// MATLAB could not be started.
    Failed(String),
}

/// Curves computed by one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub run_id: RunId,
    pub metric: ApMetric,
    /// Per foreground class curves, in class order.
    pub per_class: IndexMap<String, PrCurve>,
    /// Hand curves under each extra constraint, in evaluation order.
    pub hand_constraints: IndexMap<HandConstraint, PrCurve>,
    /// Set only when the MATLAB evaluation was requested.
    pub matlab_status: Option<MatlabStatus>,
}

impl EvaluationReport {
    /// Mean AP over the foreground classes.
    pub fn mean_ap(&self) -> f64 {
        if self.per_class.is_empty() {
            return 0.0;
        }
        self.per_class.values().map(|curve| curve.ap).sum::<f64>() / self.per_class.len() as f64
    }
}

/// Writes the results files of a detection batch and scores them.
#[derive(Debug)]
pub struct Evaluator<'a> {
    config: &'a PascalVocConfig,
    classes: &'a IndexSet<String>,
    keys: &'a [String],
    run_id: RunId,
    scorer: &'a dyn ApScorer,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        config: &'a PascalVocConfig,
        classes: &'a IndexSet<String>,
        keys: &'a [String],
        run_id: RunId,
        scorer: &'a dyn ApScorer,
    ) -> Self {
        Self {
            config,
            classes,
            keys,
            run_id,
            scorer,
        }
    }

    pub fn template(&self) -> ResultsTemplate {
        ResultsTemplate::new(
            self.config.devkit_path(),
            &self.config.year,
            &self.config.image_set,
            self.run_id.clone(),
        )
    }

    pub fn metric(&self) -> Result<ApMetric> {
        Ok(ApMetric::for_year(self.config.year_number()?))
    }

    pub fn score_request(&self, class_name: &str) -> Result<ScoreRequest> {
        let data_path = self.config.data_path();
        Ok(ScoreRequest {
            results: self.template(),
            annotation_dir: data_path.join("Annotations"),
            image_set_file: ImageIndex::image_set_file(&data_path, &self.config.image_set),
            class_name: class_name.to_owned(),
            cache_dir: self.config.devkit_path().join("annotations_cache"),
            iou_threshold: IOU_THRESHOLD,
            metric: self.metric()?,
            use_diff: self.config.use_diff,
        })
    }

    /// Write the results files, score every foreground class and persist the
    /// curves under `output_dir`.
    pub fn evaluate(
        &self,
        batch: &DetectionBatch,
        output_dir: impl AsRef<Path>,
    ) -> Result<EvaluationReport> {
        let output_dir = output_dir.as_ref();
        let template = self.template();
        let metric = self.metric()?;

        ResultsWriter::new(&template).write(batch, self.classes, self.keys)?;

        info!(
            "VOC07 metric? {}",
            if metric == ApMetric::Voc07ElevenPoint {
                "yes"
            } else {
                "no"
            }
        );
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create '{}'", output_dir.display()))?;

        let mut per_class = IndexMap::new();
        let mut hand_constraints = IndexMap::new();

        for class_name in self.foreground_classes() {
            let request = self.score_request(class_name)?;

            let curve = self
                .scorer
                .voc_eval(&request)
                .with_context(|| format!("failed to score class '{}'", class_name))?;
            info!("AP for {} = {:.4}", class_name, curve.ap);
            curve.save(output_dir.join(format!("{}_pr.pkl", class_name)))?;
            per_class.insert(class_name.to_owned(), curve);

            if class_name == HAND_CLASS {
                for constraint in HandConstraint::ALL {
                    let curve = self
                        .scorer
                        .voc_eval_hand(&request, constraint)
                        .with_context(|| {
                            format!("failed to score class '{}' + {}", class_name, constraint)
                        })?;
                    info!("AP for {} + {} = {:.4}", class_name, constraint, curve.ap);
                    curve.save(output_dir.join(format!("{}_pr_{}.pkl", class_name, constraint)))?;
                    hand_constraints.insert(constraint, curve);
                }
            }
        }

        let matlab_status = self
            .config
            .matlab_eval
            .then(|| self.run_matlab(output_dir));

        if self.config.cleanup {
            self.remove_results_files(&template);
        }

        Ok(EvaluationReport {
            run_id: self.run_id.clone(),
            metric,
            per_class,
            hand_constraints,
            matlab_status,
        })
    }

    fn foreground_classes(&self) -> impl Iterator<Item = &'a str> + 'a {
        let classes: &'a IndexSet<String> = self.classes;
        classes
            .iter()
            .map(|class_name| class_name.as_str())
            .filter(|&class_name| class_name != BACKGROUND_CLASS)
    }

    fn run_matlab(&self, output_dir: &Path) -> MatlabStatus {
        let matlab = match &self.config.matlab {
            Some(matlab) => matlab,
            None => {
                warn!("MATLAB evaluation is enabled, but no MATLAB command is configured");
                return MatlabStatus::Failed("MATLAB is not configured".into());
            }
        };
        let eval = MatlabEval::new(
            matlab,
            self.config.devkit_path(),
            self.run_id.clone(),
            &self.config.image_set,
            output_dir,
        );

        match eval.run() {
            Ok(status) => {
                if !status.success() {
                    warn!("MATLAB evaluation exited with {}", status);
                }
                MatlabStatus::Exited {
                    success: status.success(),
                    code: status.code(),
                }
            }
            Err(err) => {
                warn!("MATLAB evaluation failed: {:#}", err);
                MatlabStatus::Failed(format!("{:#}", err))
            }
        }
    }

    fn remove_results_files(&self, template: &ResultsTemplate) {
        for class_name in self.foreground_classes() {
            let path = template.path_for(class_name);
            if let Err(err) = fs::remove_file(&path) {
                debug!("unable to remove '{}': {}", path.display(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::class_set;

    #[test]
    fn report_mean_ap() {
        let mut report = EvaluationReport {
            run_id: RunId::with_salt(None),
            metric: ApMetric::Continuous,
            per_class: IndexMap::new(),
            hand_constraints: IndexMap::new(),
            matlab_status: None,
        };
        assert_eq!(report.mean_ap(), 0.0);

        for (name, ap) in [("targetobject", 0.5), ("hand", 1.0)] {
            let curve = PrCurve {
                ap,
                ..PrCurve::empty()
            };
            report.per_class.insert(name.into(), curve);
        }
        assert_eq!(report.mean_ap(), 0.75);
    }

    #[test]
    fn request_paths() {
        let config = PascalVocConfig::new("2012", "val", "/data", "/data/cache");
        let classes = class_set();
        let keys: Vec<String> = vec![];
        let scorer = VocScorer::new();
        let evaluator =
            Evaluator::new(&config, &classes, &keys, RunId::with_salt(None), &scorer);

        let request = evaluator.score_request("hand").unwrap();
        let devkit = Path::new("/data/VOCdevkit2012_handobj_100K");
        assert_eq!(request.metric, ApMetric::Continuous);
        assert_eq!(
            request.annotation_path("img001"),
            devkit.join("VOC2012/Annotations/img001.xml")
        );
        assert_eq!(
            request.image_set_file,
            devkit.join("VOC2012/ImageSets/Main/val.txt")
        );
        assert_eq!(request.cache_dir, devkit.join("annotations_cache"));
        assert_eq!(
            request.results_file(),
            devkit.join("results/VOC2012/Main/comp4_det_val_hand.txt")
        );
    }
}
