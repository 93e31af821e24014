use super::roidb::read_bincode;
use crate::{common::*, error::ensure_exists};

/// Selective search proposals, one list of 1-based `[y1, x1, y2, x2]` boxes
/// per image.
#[derive(Debug, Clone, Deserialize)]
struct SelectiveSearchFile {
    boxes: Vec<Vec<[f64; 4]>>,
}

/// Load selective search proposals and drop duplicated and small boxes.
pub fn load_selective_search_boxes(
    path: impl AsRef<Path>,
    min_size: u32,
) -> Result<Vec<Vec<XYXY<u16>>>> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let reader = BufReader::new(File::open(path)?);
    let SelectiveSearchFile { boxes } = serde_json::from_reader(reader)
        .with_context(|| format!("failed to parse selective search file '{}'", path.display()))?;

    let mut num_dropped = 0;
    let box_list: Vec<_> = boxes
        .into_iter()
        .map(|yxyx_list| -> Result<_> {
            let boxes: Vec<_> = yxyx_list
                .into_iter()
                .map(|[y1, x1, y2, x2]| to_zero_based_box([x1, y1, x2, y2]))
                .try_collect()?;
            let boxes = select(&boxes, &unique_boxes(&boxes));
            let kept = select(&boxes, &filter_small_boxes(&boxes, min_size));
            num_dropped += boxes.len() - kept.len();
            Ok(kept)
        })
        .try_collect()?;

    if num_dropped > 0 {
        debug!("dropped {} small selective search boxes", num_dropped);
    }
    Ok(box_list)
}

/// Load RPN proposals, a bincode `Vec<Vec<[f32; 4]>>` of 0-based boxes.
pub fn load_rpn_boxes(path: impl AsRef<Path>) -> Result<Vec<Vec<XYXY<u16>>>> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let raw: Vec<Vec<[f32; 4]>> = read_bincode(path)?;

    raw.into_iter()
        .map(|boxes| {
            boxes
                .into_iter()
                .map(|xyxy| {
                    XYXY::try_from_xyxy(xyxy.map(|value| value.max(0.0)))?
                        .try_cast::<u16>()
                        .ok_or_else(|| format_err!("proposal box {:?} is out of range", xyxy))
                })
                .try_collect::<_, Vec<_>, _>()
        })
        .try_collect()
}

fn to_zero_based_box(xyxy: [f64; 4]) -> Result<XYXY<u16>> {
    XYXY::try_from_xyxy(xyxy)?
        .shift(-1.0)
        .clamp_min(0.0)
        .try_cast()
        .ok_or_else(|| format_err!("proposal box {:?} is out of range", xyxy))
}

/// Indexes of the first occurrence of every distinct box, in order.
pub fn unique_boxes(boxes: &[XYXY<u16>]) -> Vec<usize> {
    let mut seen = HashSet::new();
    boxes
        .iter()
        .enumerate()
        .filter(|(_, bbox)| seen.insert(bbox.xyxy()))
        .map(|(index, _)| index)
        .collect()
}

/// Indexes of boxes with `x2 - x1 >= min_size` and `y2 - y1 > min_size`.
pub fn filter_small_boxes(boxes: &[XYXY<u16>], min_size: u32) -> Vec<usize> {
    boxes
        .iter()
        .enumerate()
        .filter(|(_, bbox)| {
            let w = (bbox.x2() - bbox.x1()) as u32;
            let h = (bbox.y2() - bbox.y1()) as u32;
            w >= min_size && h > min_size
        })
        .map(|(index, _)| index)
        .collect()
}

fn select<T: Clone>(items: &[T], indexes: &[usize]) -> Vec<T> {
    indexes.iter().map(|&index| items[index].clone()).collect()
}
