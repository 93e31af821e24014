use super::*;
use crate::{
    common::*,
    eval::{ApScorer, DetectionBatch, EvaluationReport, RunId},
};

/// An image database: a dataset split with its ground truth and the way its
/// detections are scored.
pub trait ImageDatabase
where
    Self: Debug,
{
    /// The dataset name, e.g. `voc_2007_test`.
    fn name(&self) -> &str;

    /// The list of class names. Index 0 is the background.
    fn classes(&self) -> &IndexSet<String>;

    fn num_classes(&self) -> usize {
        self.classes().len()
    }

    /// The image keys in split order.
    fn image_index(&self) -> &[String];

    fn num_images(&self) -> usize {
        self.image_index().len()
    }

    fn image_path_from_index(&self, key: &str) -> Result<PathBuf>;

    fn image_path_at(&self, index: usize) -> Result<PathBuf> {
        let key = self.image_index().get(index).ok_or_else(|| {
            format_err!(
                "image index {} is out of bound {}",
                index,
                self.num_images()
            )
        })?;
        self.image_path_from_index(key)
    }

    /// The image identifier is its position in the split.
    fn image_id_at(&self, index: usize) -> usize {
        index
    }

    fn roidb(&self, source: RoidbSource) -> Result<Roidb>;

    /// Write per-class results files of the run and return their paths.
    fn write_results(&self, batch: &DetectionBatch, run_id: &RunId) -> Result<Vec<PathBuf>>;

    /// Write the results files of the run and score them.
    fn evaluate_detections(
        &self,
        batch: &DetectionBatch,
        output_dir: &Path,
        run_id: &RunId,
        scorer: &dyn ApScorer,
    ) -> Result<EvaluationReport>;

    /// Official submission runs keep stable results file names.
    fn competition_mode(&mut self, on: bool);
}
