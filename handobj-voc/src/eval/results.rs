use super::*;
use crate::{
    common::*,
    config::PascalVocConfig,
    dataset::BACKGROUND_CLASS,
};
use once_cell::sync::Lazy;
use uuid::Uuid;

/// The competition identifier of results files.
pub const COMP_ID: &str = "comp4";

static PROCESS_SALT: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Identifies the results files of one evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId {
    comp_id: String,
    salt: Option<String>,
}

impl RunId {
    /// Uses the salt drawn once per process if the config enables salting.
    pub fn new(config: &PascalVocConfig) -> Self {
        let salt = config.use_salt.then(|| String::clone(&PROCESS_SALT));
        Self::with_salt(salt)
    }

    pub fn with_salt(salt: Option<String>) -> Self {
        Self {
            comp_id: COMP_ID.to_owned(),
            salt,
        }
    }

    pub fn comp_id(&self) -> &str {
        &self.comp_id
    }

    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.salt {
            Some(salt) => write!(f, "{}_{}", self.comp_id, salt),
            None => write!(f, "{}", self.comp_id),
        }
    }
}

/// Resolves `<devkit>/results/VOC<year>/Main/<run_id>_det_<split>_<class>.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsTemplate {
    dir: PathBuf,
    run_id: RunId,
    image_set: String,
}

impl ResultsTemplate {
    pub fn new(devkit_path: impl AsRef<Path>, year: &str, image_set: &str, run_id: RunId) -> Self {
        let dir = devkit_path
            .as_ref()
            .join("results")
            .join(format!("VOC{}", year))
            .join("Main");
        Self {
            dir,
            run_id,
            image_set: image_set.to_owned(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn path_for(&self, class_name: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_det_{}_{}.txt",
            self.run_id, self.image_set, class_name
        ))
    }
}

/// Writes per-class detection results files.
#[derive(Debug, Clone)]
pub struct ResultsWriter<'a> {
    template: &'a ResultsTemplate,
}

impl<'a> ResultsWriter<'a> {
    pub fn new(template: &'a ResultsTemplate) -> Self {
        Self { template }
    }

    /// Write one file per foreground class and return the written paths.
    ///
    /// `batch` is indexed by the positions of `classes` and `keys`.
    pub fn write(
        &self,
        batch: &DetectionBatch,
        classes: &IndexSet<String>,
        keys: &[String],
    ) -> Result<Vec<PathBuf>> {
        ensure!(
            batch.num_classes() == classes.len(),
            "detections have {} classes, but the dataset has {}",
            batch.num_classes(),
            classes.len()
        );
        ensure!(
            batch.num_images() == keys.len(),
            "detections have {} images, but the dataset has {}",
            batch.num_images(),
            keys.len()
        );

        fs::create_dir_all(self.template.dir()).with_context(|| {
            format!(
                "failed to create results directory '{}'",
                self.template.dir().display()
            )
        })?;

        classes
            .iter()
            .enumerate()
            .filter(|(_, class_name)| *class_name != BACKGROUND_CLASS)
            .map(|(class_index, class_name)| -> Result<_> {
                let path = self.template.path_for(class_name);
                info!("writing {} VOC results file '{}'", class_name, path.display());

                let mut writer = BufWriter::new(
                    File::create(&path)
                        .with_context(|| format!("failed to create '{}'", path.display()))?,
                );
                for (image_index, key) in keys.iter().enumerate() {
                    for row in batch.get(class_index, image_index) {
                        writeln!(writer, "{}", format_detection_line(key, row))?;
                    }
                }
                writer.flush()?;
                Ok(path)
            })
            .try_collect()
    }
}

/// Format a detection as a results line. Boxes are written 1-based.
pub fn format_detection_line(key: &str, row: &DetectionRow) -> String {
    let [x1, y1, x2, y2] = row.bbox.xyxy();
    let attrs = &row.attributes;
    format!(
        "{} {:.3} {:.1} {:.1} {:.1} {:.1} {:.1} {:.3} {:.3} {:.3} {:.3}",
        key,
        row.score,
        x1 + 1.0,
        y1 + 1.0,
        x2 + 1.0,
        y2 + 1.0,
        row.contact_state_code() as f32,
        attrs.magnitude,
        attrs.unit_dx,
        attrs.unit_dy,
        attrs.hand_side
    )
}

/// Parse a results line back into the image key and a 0-based detection.
pub fn parse_detection_line(line: &str) -> Result<(String, DetectionRow)> {
    let mut tokens = line.split_whitespace();
    let key = tokens
        .next()
        .ok_or_else(|| format_err!("empty results line"))?
        .to_owned();
    let values: Vec<f32> = tokens
        .map(|token| {
            token
                .parse::<f32>()
                .with_context(|| format!("invalid number '{}' in results line", token))
        })
        .try_collect()?;
    ensure!(
        values.len() == 10,
        "expect 11 fields in results line, but get {}",
        values.len() + 1
    );
    ensure!(
        values.iter().all(|value| value.is_finite()),
        "non-finite value in results line '{}'",
        line
    );

    let score = values[0];
    let row: Vec<f32> = values[1..5]
        .iter()
        .map(|coord| coord - 1.0)
        .chain(iter::once(score))
        .chain(values[5..].iter().copied())
        .collect();

    Ok((key, DetectionRow::from_slice(&row)?))
}

/// Read a results file written by [ResultsWriter].
pub fn read_results_file(path: impl AsRef<Path>) -> Result<Vec<(String, DetectionRow)>> {
    let path = path.as_ref();
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?,
    );
    reader
        .lines()
        .enumerate()
        .filter_map(|(line_num, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(parse_detection_line(&line).with_context(|| {
                format!("at line {} of '{}'", line_num + 1, path.display())
            })),
            Err(err) => Some(Err(Error::from(err))),
        })
        .try_collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::class_set;

    fn hand_row() -> DetectionRow {
        DetectionRow::from_slice(&[9.0, 19.0, 99.0, 199.0, 0.87654, 3.9, 0.12, 0.6, -0.8, 0.93])
            .unwrap()
    }

    #[test]
    fn run_id_salt() {
        let mut config = PascalVocConfig::new("2007", "test", "data", "cache");
        let run_id = RunId::new(&config);
        let salt = run_id.salt().unwrap();
        assert_eq!(salt.len(), 36);
        assert_eq!(salt.matches('-').count(), 4);
        assert_eq!(&salt[14..15], "4");
        assert!(run_id.to_string().starts_with("comp4_"));
        assert_eq!(RunId::new(&config), run_id);
        assert!(Uuid::parse_str(salt).is_ok());

        config.competition_mode(true);
        assert_eq!(RunId::new(&config).to_string(), "comp4");
    }

    #[test]
    fn template_paths() {
        let template = ResultsTemplate::new("devkit", "2007", "test", RunId::with_salt(None));
        assert_eq!(
            template.path_for("hand"),
            Path::new("devkit/results/VOC2007/Main/comp4_det_test_hand.txt")
        );
    }

    #[test]
    fn line_format() {
        let line = format_detection_line("img001", &hand_row());
        assert_eq!(
            line,
            "img001 0.877 10.0 20.0 100.0 200.0 3.0 0.120 0.600 -0.800 0.930"
        );

        let (key, row) = parse_detection_line(&line).unwrap();
        assert_eq!(key, "img001");
        assert_eq!(row.bbox.xyxy(), [9.0, 19.0, 99.0, 199.0]);
        assert_eq!(row.contact_state_code(), 3);

        assert!(parse_detection_line("img001 0.5 1.0").is_err());
        assert!(parse_detection_line("img001 0.5 1 1 2 2 0 0 0 0 nan").is_err());
    }

    #[test]
    fn write_results_files() {
        let dir = tempfile::tempdir().unwrap();
        let template =
            ResultsTemplate::new(dir.path(), "2007", "test", RunId::with_salt(None));
        let classes = class_set();
        let keys = vec!["img001".to_owned(), "img002".to_owned()];

        let mut batch = DetectionBatch::new(3, 2);
        batch.push(2, 0, hand_row()).unwrap();

        let paths = ResultsWriter::new(&template)
            .write(&batch, &classes, &keys)
            .unwrap();
        assert_eq!(
            paths,
            vec![
                template.path_for("targetobject"),
                template.path_for("hand")
            ]
        );
        assert!(!template.path_for(BACKGROUND_CLASS).exists());
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "");

        let rows = read_results_file(&paths[1]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "img001");

        let wrong = DetectionBatch::new(3, 1);
        assert!(ResultsWriter::new(&template)
            .write(&wrong, &classes, &keys)
            .is_err());
    }
}
