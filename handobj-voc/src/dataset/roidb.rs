use super::*;
use crate::common::*;
use serde::de::DeserializeOwned;

/// Where the records of a roidb come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoidbSource {
    /// Parsed annotations only.
    GroundTruth,
    /// Selective search proposals, merged with ground truth when available.
    SelectiveSearch,
    /// Region proposal network boxes, merged with ground truth when available.
    Rpn,
}

/// Persists parsed roidbs under a cache directory.
#[derive(Debug, Clone)]
pub struct RoidbCache {
    cache_dir: PathBuf,
}

impl RoidbCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `<cache_dir>/<name>_<kind>_roidb.pkl`
    pub fn cache_file(&self, name: &str, kind: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_{}_roidb.pkl", name, kind))
    }

    pub fn gt_cache_file(&self, name: &str) -> PathBuf {
        self.cache_file(name, "gt")
    }

    /// Load the ground truth roidb of `name`, parsing and caching it on a miss.
    ///
    /// An existing cache file is returned as is, without looking at the
    /// annotations. Parsing stops at the first failing key and nothing is
    /// written in that case.
    pub fn load<F>(&self, name: &str, keys: &[String], mut parse: F) -> Result<Roidb>
    where
        F: FnMut(&str) -> Result<ImageRecord>,
    {
        let cache_file = self.gt_cache_file(name);
        load_or_build(&cache_file, || {
            keys.iter()
                .map(|key| {
                    parse(key.as_str())
                        .with_context(|| format!("failed to load annotation of '{}'", key))
                })
                .try_collect()
        })
    }
}

/// Deserialize `path` if it exists, otherwise build the value and persist it.
pub fn load_or_build<T, F>(path: &Path, build: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    if path.exists() {
        let value = read_bincode(path)?;
        info!("cache loaded from '{}'", path.display());
        return Ok(value);
    }

    let value = build()?;
    write_bincode(path, &value)?;
    info!("wrote cache to '{}'", path.display());
    Ok(value)
}

pub fn read_bincode<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?,
    );
    let value = bincode::deserialize_from(reader)
        .with_context(|| format!("failed to deserialize '{}'", path.display()))?;
    Ok(value)
}

pub fn write_bincode<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("failed to create '{}'", path.display()))?,
    );
    bincode::serialize_into(&mut writer, value)
        .with_context(|| format!("failed to serialize '{}'", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Concatenate the records of `b` after the records of `a`, image by image.
pub fn merge_roidbs(a: &[ImageRecord], b: &[ImageRecord]) -> Result<Roidb> {
    ensure!(
        a.len() == b.len(),
        "cannot merge roidbs of {} and {} images",
        a.len(),
        b.len()
    );
    a.iter().zip(b).map(|(lhs, rhs)| lhs.merge(rhs)).try_collect()
}

/// Build proposal records from per-image box lists.
///
/// When ground truth is given, each proposal stores its best overlap with a
/// ground truth box at that box's class column.
pub fn create_roidb_from_box_list(
    box_list: Vec<Vec<XYXY<u16>>>,
    gt_roidb: Option<&[ImageRecord]>,
    num_classes: usize,
) -> Result<Roidb> {
    if let Some(gt_roidb) = gt_roidb {
        ensure!(
            box_list.len() == gt_roidb.len(),
            "number of box lists ({}) must match the number of images ({})",
            box_list.len(),
            gt_roidb.len()
        );
    }

    box_list
        .into_iter()
        .enumerate()
        .map(|(index, boxes)| {
            let gt = gt_roidb.map(|gt_roidb| &gt_roidb[index]);
            let rows: Vec<Vec<(usize, f32)>> = boxes
                .iter()
                .map(|bbox| match gt {
                    Some(gt) => best_gt_overlap(bbox, gt).into_iter().collect(),
                    None => vec![],
                })
                .collect();
            let gt_overlaps = CsrMatrix::from_rows(rows, num_classes)?;
            Ok(ImageRecord::from_proposals(boxes, gt_overlaps))
        })
        .try_collect()
}

/// The `(class, overlap)` of the ground truth box best covering `bbox`.
fn best_gt_overlap(bbox: &XYXY<u16>, gt: &ImageRecord) -> Option<(usize, f32)> {
    let bbox = to_f64(bbox)?;
    let (argmax, max) = gt
        .boxes
        .iter()
        .enumerate()
        .filter_map(|(index, gt_box)| Some((index, bbox.iou_with(&to_f64(gt_box)?))))
        .fold(None, |best: Option<(usize, f64)>, (index, iou)| match best {
            Some((_, best_iou)) if best_iou >= iou => best,
            _ => Some((index, iou)),
        })?;

    (max > 0.0).then(|| (gt.gt_classes[argmax] as usize, max as f32))
}

fn to_f64(bbox: &XYXY<u16>) -> Option<XYXY<f64>> {
    bbox.try_cast()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gt_record(boxes: &[[u16; 4]], classes: &[i32]) -> ImageRecord {
        let boxes: Vec<_> = boxes
            .iter()
            .map(|&xyxy| XYXY::try_from_xyxy(xyxy).unwrap())
            .collect();
        let columns: Vec<_> = classes.iter().map(|&class| class as usize).collect();
        let mut record =
            ImageRecord::from_proposals(boxes, CsrMatrix::one_hot(&columns, 3).unwrap());
        record.gt_classes = classes.to_vec();
        record
    }

    #[test]
    fn proposals_take_best_overlap() {
        let gt = vec![gt_record(&[[0, 0, 9, 9], [20, 20, 29, 29]], &[1, 2])];
        let proposals = vec![vec![
            XYXY::try_from_xyxy([20, 20, 29, 29]).unwrap(),
            XYXY::try_from_xyxy([0, 0, 4, 9]).unwrap(),
            XYXY::try_from_xyxy([50, 50, 60, 60]).unwrap(),
        ]];

        let roidb = create_roidb_from_box_list(proposals, Some(gt.as_slice()), 3).unwrap();
        let record = &roidb[0];

        assert!(record.is_consistent());
        assert_eq!(record.gt_classes, vec![0, 0, 0]);
        assert_eq!(record.gt_overlaps.get(0, 2), 1.0);
        assert_eq!(record.gt_overlaps.get(1, 1), 0.5);
        assert_eq!(record.gt_overlaps.row(2).count(), 0);
    }

    #[test]
    fn merge_appends_rows() {
        let gt = vec![gt_record(&[[0, 0, 9, 9]], &[2])];
        let proposals = create_roidb_from_box_list(
            vec![vec![XYXY::try_from_xyxy([0, 0, 9, 9]).unwrap()]],
            Some(gt.as_slice()),
            3,
        )
        .unwrap();

        let merged = merge_roidbs(&gt, &proposals).unwrap();
        assert_eq!(merged[0].num_objects(), 2);
        assert!(merged[0].is_consistent());
        assert_eq!(merged[0].gt_classes, vec![2, 0]);
        assert_eq!(merged[0].gt_overlaps.get(1, 2), 1.0);

        assert!(merge_roidbs(&gt, &[]).is_err());
    }

    #[test]
    fn cache_roundtrip_skips_build() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RoidbCache::new(dir.path().join("cache"));
        let keys = vec!["a".to_owned(), "b".to_owned()];

        let first = cache
            .load("voc_2007_val", &keys, |_| Ok(gt_record(&[[1, 2, 3, 4]], &[1])))
            .unwrap();
        assert!(cache.gt_cache_file("voc_2007_val").is_file());

        let second = cache
            .load("voc_2007_val", &keys, |key| bail!("'{}' must not be parsed", key))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn failed_build_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RoidbCache::new(dir.path());
        let keys = vec!["a".to_owned(), "b".to_owned()];

        let result = cache.load("voc_2007_val", &keys, |key| {
            ensure!(key == "a", "bad annotation");
            Ok(ImageRecord::empty(3))
        });
        assert!(result.is_err());
        assert!(!cache.gt_cache_file("voc_2007_val").exists());
    }
}
