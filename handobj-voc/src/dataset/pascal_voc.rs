use super::*;
use crate::{
    common::*,
    config::PascalVocConfig,
    error::ensure_exists,
    eval::{
        ApScorer, DetectionBatch, EvaluationReport, Evaluator, ResultsTemplate,
        ResultsWriter, RunId,
    },
};

/// The hand/object contact dataset in PASCAL VOC layout.
#[derive(Debug, Clone)]
pub struct PascalVoc {
    config: PascalVocConfig,
    name: String,
    classes: IndexSet<String>,
    index: ImageIndex,
    cache: RoidbCache,
}

impl PascalVoc {
    pub fn new(config: PascalVocConfig) -> Result<Self> {
        config.year_number()?;
        ensure_exists(config.devkit_path())?;
        let data_path = config.data_path();
        ensure_exists(&data_path)?;

        let index = ImageIndex::load(&data_path, &config.image_set)?;
        let name = format!("voc_{}_{}", config.year, config.image_set);
        info!("{} has {} images", name, index.len());

        Ok(Self {
            name,
            classes: class_set(),
            index,
            cache: RoidbCache::new(&config.cache_dir),
            config,
        })
    }

    pub fn config(&self) -> &PascalVocConfig {
        &self.config
    }

    pub fn devkit_path(&self) -> PathBuf {
        self.config.devkit_path()
    }

    pub fn data_path(&self) -> &Path {
        self.index.data_path()
    }

    pub fn cache(&self) -> &RoidbCache {
        &self.cache
    }

    /// Parse the annotation of `key` into a ground truth record.
    pub fn load_annotation(&self, key: &str) -> Result<ImageRecord> {
        let path = self.index.annotation_path(key);
        let annotation = parse_annotation_file(&path)?;
        ImageRecord::from_annotation(&annotation, &path)
    }

    /// The ground truth roidb, cached at `<cache_dir>/<name>_gt_roidb.pkl`.
    pub fn gt_roidb(&self) -> Result<Roidb> {
        self.cache
            .load(&self.name, self.index.keys(), |key| self.load_annotation(key))
    }

    /// `<data_dir>/selective_search_data/<name>.json`
    pub fn selective_search_file(&self) -> PathBuf {
        self.config
            .data_dir
            .join("selective_search_data")
            .join(format!("{}.json", self.name))
    }

    pub fn selective_search_roidb(&self) -> Result<Roidb> {
        let cache_file = self.cache.cache_file(&self.name, "selective_search");
        load_or_build(&cache_file, || {
            let box_list =
                load_selective_search_boxes(self.selective_search_file(), self.config.min_size)?;
            self.proposal_roidb(box_list)
        })
    }

    pub fn rpn_roidb(&self) -> Result<Roidb> {
        let path = self
            .config
            .rpn_file
            .as_ref()
            .ok_or_else(|| format_err!("rpn_file is not set for '{}'", self.name))?;
        info!("loading {}", path.display());
        let box_list = load_rpn_boxes(path)?;
        self.proposal_roidb(box_list)
    }

    /// Proposals are merged with the ground truth except for test splits
    /// after 2007.
    pub fn merges_gt(&self) -> Result<bool> {
        Ok(self.config.year_number()? == 2007 || self.config.image_set != "test")
    }

    fn proposal_roidb(&self, box_list: Vec<Vec<XYXY<u16>>>) -> Result<Roidb> {
        ensure!(
            box_list.len() == self.num_images(),
            "number of proposal lists ({}) must match the number of images ({})",
            box_list.len(),
            self.num_images()
        );

        if self.merges_gt()? {
            let gt_roidb = self.gt_roidb()?;
            let proposals = create_roidb_from_box_list(
                box_list,
                Some(gt_roidb.as_slice()),
                self.num_classes(),
            )?;
            merge_roidbs(&gt_roidb, &proposals)
        } else {
            create_roidb_from_box_list(box_list, None, self.num_classes())
        }
    }

    pub fn results_template(&self, run_id: &RunId) -> ResultsTemplate {
        ResultsTemplate::new(
            self.devkit_path(),
            &self.config.year,
            &self.config.image_set,
            run_id.clone(),
        )
    }
}

impl ImageDatabase for PascalVoc {
    fn name(&self) -> &str {
        &self.name
    }

    fn classes(&self) -> &IndexSet<String> {
        &self.classes
    }

    fn image_index(&self) -> &[String] {
        self.index.keys()
    }

    fn image_path_from_index(&self, key: &str) -> Result<PathBuf> {
        self.index.image_path(key)
    }

    fn roidb(&self, source: RoidbSource) -> Result<Roidb> {
        match source {
            RoidbSource::GroundTruth => self.gt_roidb(),
            RoidbSource::SelectiveSearch => self.selective_search_roidb(),
            RoidbSource::Rpn => self.rpn_roidb(),
        }
    }

    fn write_results(&self, batch: &DetectionBatch, run_id: &RunId) -> Result<Vec<PathBuf>> {
        ResultsWriter::new(&self.results_template(run_id)).write(
            batch,
            &self.classes,
            self.index.keys(),
        )
    }

    fn evaluate_detections(
        &self,
        batch: &DetectionBatch,
        output_dir: &Path,
        run_id: &RunId,
        scorer: &dyn ApScorer,
    ) -> Result<EvaluationReport> {
        Evaluator::new(
            &self.config,
            &self.classes,
            self.index.keys(),
            run_id.clone(),
            scorer,
        )
        .evaluate(batch, output_dir)
    }

    fn competition_mode(&mut self, on: bool) {
        self.config.competition_mode(on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatasetError;

    const HAND_XML: &str = r#"<annotation>
        <object>
            <name>hand</name>
            <difficult>0</difficult>
            <bndbox><xmin>11</xmin><ymin>21</ymin><xmax>60</xmax><ymax>80</ymax></bndbox>
            <contactstate>3</contactstate>
            <handside>1</handside>
        </object>
    </annotation>"#;

    fn make_devkit(year: &str, split: &str) -> (tempfile::TempDir, PascalVocConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = PascalVocConfig::new(year, split, dir.path(), dir.path().join("cache"));
        let data_path = config.data_path();
        for sub in ["ImageSets/Main", "Annotations", "JPEGImages"] {
            fs::create_dir_all(data_path.join(sub)).unwrap();
        }
        fs::write(
            data_path.join(format!("ImageSets/Main/{}.txt", split)),
            "img001\nimg002\n",
        )
        .unwrap();
        fs::write(data_path.join("Annotations/img001.xml"), HAND_XML).unwrap();
        fs::write(
            data_path.join("Annotations/img002.xml"),
            "<annotation></annotation>",
        )
        .unwrap();
        (dir, config)
    }

    #[test]
    fn dataset_name_and_classes() {
        let (_dir, config) = make_devkit("2007", "trainval");
        let voc = PascalVoc::new(config).unwrap();
        assert_eq!(voc.name(), "voc_2007_trainval");
        assert_eq!(voc.num_classes(), 3);
        assert_eq!(voc.image_index(), ["img001", "img002"]);
        assert_eq!(voc.image_id_at(1), 1);
        assert!(voc.image_path_at(2).is_err());
    }

    #[test]
    fn missing_devkit() {
        let dir = tempfile::tempdir().unwrap();
        let config = PascalVocConfig::new("2007", "test", dir.path(), dir.path());
        let err = PascalVoc::new(config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::NotFound { .. })
        ));
    }

    #[test]
    fn gt_roidb_records() {
        let (_dir, config) = make_devkit("2007", "val");
        let voc = PascalVoc::new(config).unwrap();
        let roidb = voc.roidb(RoidbSource::GroundTruth).unwrap();

        assert_eq!(roidb.len(), 2);
        assert_eq!(roidb[0].boxes[0].xyxy(), [10, 20, 59, 79]);
        assert_eq!(roidb[0].gt_classes, vec![2]);
        assert_eq!(roidb[0].contact_state, vec![3]);
        assert_eq!(roidb[0].seg_areas, vec![50.0 * 60.0]);
        assert_eq!(roidb[1].num_objects(), 0);
        assert!(voc.cache().gt_cache_file("voc_2007_val").is_file());
    }

    #[test]
    fn proposals_merge_rule() {
        let (_dir, config) = make_devkit("2012", "test");
        let voc = PascalVoc::new(config).unwrap();
        assert!(!voc.merges_gt().unwrap());

        let (_dir, config) = make_devkit("2012", "val");
        let voc = PascalVoc::new(config).unwrap();
        assert!(voc.merges_gt().unwrap());

        let (_dir, config) = make_devkit("2007", "test");
        let voc = PascalVoc::new(config).unwrap();
        assert!(voc.merges_gt().unwrap());
    }

    #[test]
    fn selective_search_merged_with_gt() {
        let (_dir, config) = make_devkit("2007", "val");
        let voc = PascalVoc::new(config).unwrap();
        let ss_dir = voc.config().data_dir.join("selective_search_data");
        fs::create_dir_all(&ss_dir).unwrap();
        fs::write(
            voc.selective_search_file(),
            r#"{"boxes": [[[21, 11, 80, 60], [1, 1, 2, 2]], [[5, 5, 50, 50]]]}"#,
        )
        .unwrap();

        let roidb = voc.roidb(RoidbSource::SelectiveSearch).unwrap();
        assert_eq!(roidb[0].num_objects(), 2);
        assert_eq!(roidb[0].gt_classes, vec![2, 0]);
        assert_eq!(roidb[0].gt_overlaps.get(1, 2), 1.0);
        assert_eq!(roidb[1].num_objects(), 1);
        assert!(roidb.iter().all(|record| record.is_consistent()));
        assert!(voc
            .cache()
            .cache_file("voc_2007_val", "selective_search")
            .is_file());

        assert!(voc.roidb(RoidbSource::Rpn).is_err());
    }

    #[test]
    fn salt_follows_competition_mode() {
        let (_dir, config) = make_devkit("2007", "val");
        let mut voc = PascalVoc::new(config).unwrap();
        let salted = RunId::new(voc.config());
        assert!(salted.salt().is_some());
        assert!(voc
            .results_template(&salted)
            .path_for("hand")
            .ends_with(format!("{}_det_val_hand.txt", salted)));

        voc.competition_mode(true);
        assert_eq!(RunId::new(voc.config()).to_string(), "comp4");
        assert!(!voc.config().cleanup);
    }
}
