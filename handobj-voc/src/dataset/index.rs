use crate::{
    common::*,
    error::{ensure_exists, DatasetError},
};

pub const IMAGE_EXT: &str = "jpg";

/// The ordered image keys of a split.
#[derive(Debug, Clone)]
pub struct ImageIndex {
    data_path: PathBuf,
    image_set: String,
    keys: Vec<String>,
}

impl ImageIndex {
    /// Load `<data_path>/ImageSets/Main/<image_set>.txt`.
    pub fn load(data_path: impl AsRef<Path>, image_set: &str) -> Result<Self> {
        let data_path = data_path.as_ref();
        ensure_exists(data_path)?;

        let image_set_file = Self::image_set_file(data_path, image_set);
        let keys = read_image_set_file(&image_set_file)?;

        let num_blank = keys.iter().filter(|key| key.is_empty()).count();
        if num_blank > 0 {
            warn!(
                "{} blank lines in '{}' are kept as empty image keys",
                num_blank,
                image_set_file.display()
            );
        }

        Ok(Self {
            data_path: data_path.to_owned(),
            image_set: image_set.to_owned(),
            keys,
        })
    }

    pub fn image_set_file(data_path: impl AsRef<Path>, image_set: &str) -> PathBuf {
        data_path
            .as_ref()
            .join("ImageSets")
            .join("Main")
            .join(format!("{}.txt", image_set))
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn image_set(&self) -> &str {
        &self.image_set
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `<data_path>/JPEGImages/<key>.jpg`, which must exist.
    pub fn image_path(&self, key: &str) -> Result<PathBuf> {
        let path = self
            .data_path
            .join("JPEGImages")
            .join(format!("{}.{}", key, IMAGE_EXT));
        if !path.is_file() {
            return Err(DatasetError::not_found(path).into());
        }
        Ok(path)
    }

    /// `<data_path>/Annotations/<key>.xml`. Existence is checked on parsing.
    pub fn annotation_path(&self, key: &str) -> PathBuf {
        self.data_path
            .join("Annotations")
            .join(format!("{}.xml", key))
    }
}

/// Read an image set list. Each line is trimmed, blank lines are kept.
pub fn read_image_set_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read image set file '{}'", path.display()))?;
    let keys = text.lines().map(|line| line.trim().to_owned()).collect();
    Ok(keys)
}
