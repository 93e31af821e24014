use super::*;
use crate::{common::*, error::DatasetError};

/// The ordered per-image records of a dataset split.
pub type Roidb = Vec<ImageRecord>;

/// Ground truth (or proposals) of one image.
///
/// Every per-box vector has the same length, the number of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 0-based boxes.
    pub boxes: Vec<XYXY<u16>>,
    pub gt_classes: Vec<i32>,
    pub gt_ishard: Vec<i32>,
    /// `(num_objects, num_classes)` class overlaps.
    pub gt_overlaps: CsrMatrix,
    pub flipped: bool,
    pub seg_areas: Vec<f32>,
    pub contact_state: Vec<i32>,
    pub contact_right: Vec<i32>,
    pub contact_left: Vec<i32>,
    pub magnitude: Vec<f32>,
    pub unit_dx: Vec<f32>,
    pub unit_dy: Vec<f32>,
    pub hand_side: Vec<i32>,
}

impl ImageRecord {
    pub fn empty(num_classes: usize) -> Self {
        Self::from_proposals(vec![], CsrMatrix::zeros(0, num_classes))
    }

    /// Convert a parsed annotation to a ground truth record.
    ///
    /// Boxes become 0-based and are clamped at zero. The upper bound is not
    /// checked against the image size.
    pub fn from_annotation(annotation: &Annotation, path: &Path) -> Result<Self> {
        let (
            boxes,
            gt_classes,
            gt_ishard,
            seg_areas,
            contact_state,
            contact_right,
            contact_left,
            magnitude,
            unit_dx,
            unit_dy,
            hand_side,
        ) = annotation
            .objects
            .iter()
            .map(|object| -> Result<_> {
                let zero_based = object.bbox.shift(-1.0).clamp_min(0.0);
                // boxes beyond the u16 range cannot be stored in the roidb
                // and fail the whole build, like any other malformed box
                let bbox: XYXY<u16> = zero_based.try_cast().ok_or_else(|| {
                    DatasetError::malformed(
                        path,
                        format!("box {:?} is out of range", object.bbox.xyxy()),
                    )
                })?;
                let hand = &object.hand;

                Ok((
                    bbox,
                    object.class_index as i32,
                    object.difficult,
                    zero_based.area(),
                    hand.contact_state,
                    hand.contact_right,
                    hand.contact_left,
                    hand.magnitude,
                    hand.unit_dx,
                    hand.unit_dy,
                    hand.hand_side,
                ))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip_n_vec();

        let columns: Vec<_> = gt_classes.iter().map(|&class| class as usize).collect();
        let gt_overlaps = CsrMatrix::one_hot(&columns, CLASSES.len())?;

        Ok(Self {
            boxes,
            gt_classes,
            gt_ishard,
            gt_overlaps,
            flipped: false,
            seg_areas,
            contact_state,
            contact_right,
            contact_left,
            magnitude,
            unit_dx,
            unit_dy,
            hand_side,
        })
    }

    /// A record of proposal boxes. Classes, areas and hand attributes are zero.
    pub fn from_proposals(boxes: Vec<XYXY<u16>>, gt_overlaps: CsrMatrix) -> Self {
        let n = boxes.len();
        Self {
            boxes,
            gt_classes: vec![0; n],
            gt_ishard: vec![0; n],
            gt_overlaps,
            flipped: false,
            seg_areas: vec![0.0; n],
            contact_state: vec![0; n],
            contact_right: vec![0; n],
            contact_left: vec![0; n],
            magnitude: vec![0.0; n],
            unit_dx: vec![0.0; n],
            unit_dy: vec![0.0; n],
            hand_side: vec![0; n],
        }
    }

    pub fn num_objects(&self) -> usize {
        self.boxes.len()
    }

    /// Check that all per-box vectors agree in length.
    pub fn is_consistent(&self) -> bool {
        let n = self.boxes.len();
        [
            self.gt_classes.len(),
            self.gt_ishard.len(),
            self.gt_overlaps.num_rows(),
            self.seg_areas.len(),
            self.contact_state.len(),
            self.contact_right.len(),
            self.contact_left.len(),
            self.magnitude.len(),
            self.unit_dx.len(),
            self.unit_dy.len(),
            self.hand_side.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }

    /// Append the rows of `other` after the rows of `self`.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        fn cat<T: Clone>(lhs: &[T], rhs: &[T]) -> Vec<T> {
            lhs.iter().chain(rhs).cloned().collect()
        }

        Ok(Self {
            boxes: cat(&self.boxes, &other.boxes),
            gt_classes: cat(&self.gt_classes, &other.gt_classes),
            gt_ishard: cat(&self.gt_ishard, &other.gt_ishard),
            gt_overlaps: self.gt_overlaps.vstack(&other.gt_overlaps)?,
            flipped: self.flipped,
            seg_areas: cat(&self.seg_areas, &other.seg_areas),
            contact_state: cat(&self.contact_state, &other.contact_state),
            contact_right: cat(&self.contact_right, &other.contact_right),
            contact_left: cat(&self.contact_left, &other.contact_left),
            magnitude: cat(&self.magnitude, &other.magnitude),
            unit_dx: cat(&self.unit_dx, &other.unit_dx),
            unit_dy: cat(&self.unit_dy, &other.unit_dy),
            hand_side: cat(&self.hand_side, &other.hand_side),
        })
    }
}

/// Sparse matrix in compressed sparse row layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    num_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f32>,
}

impl CsrMatrix {
    pub fn zeros(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_cols,
            indptr: vec![0; num_rows + 1],
            indices: vec![],
            data: vec![],
        }
    }

    /// Build from rows of `(column, value)` entries. Zero values are dropped.
    pub fn from_rows<R>(rows: impl IntoIterator<Item = R>, num_cols: usize) -> Result<Self>
    where
        R: IntoIterator<Item = (usize, f32)>,
    {
        let mut indptr = vec![0];
        let mut indices = vec![];
        let mut data = vec![];

        for row in rows {
            let mut entries: Vec<_> = row.into_iter().filter(|&(_, value)| value != 0.0).collect();
            entries.sort_by_key(|&(col, _)| col);
            ensure!(
                entries.iter().map(|&(col, _)| col).tuple_windows().all(|(a, b)| a < b),
                "duplicated column in sparse row"
            );
            for (col, value) in entries {
                ensure!(
                    col < num_cols,
                    "column {} is out of bound {}",
                    col,
                    num_cols
                );
                indices.push(col);
                data.push(value);
            }
            indptr.push(indices.len());
        }

        Ok(Self {
            num_cols,
            indptr,
            indices,
            data,
        })
    }

    /// One row per column index with a single `1.0` entry.
    pub fn one_hot(columns: &[usize], num_cols: usize) -> Result<Self> {
        Self::from_rows(columns.iter().map(|&col| iter::once((col, 1.0))), num_cols)
    }

    pub fn num_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_cols)
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let range = self.indptr[row]..self.indptr[row + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.data[range].iter().copied())
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.row(row)
            .find(|&(index, _)| index == col)
            .map(|(_, value)| value)
            .unwrap_or(0.0)
    }

    pub fn to_dense(&self) -> Vec<Vec<f32>> {
        (0..self.num_rows())
            .map(|row| {
                let mut dense = vec![0.0; self.num_cols];
                self.row(row).for_each(|(col, value)| dense[col] = value);
                dense
            })
            .collect()
    }

    pub fn vstack(&self, other: &Self) -> Result<Self> {
        ensure!(
            self.num_cols == other.num_cols,
            "cannot stack matrices with {} and {} columns",
            self.num_cols,
            other.num_cols
        );
        let offset = self.nnz();
        let indptr = self
            .indptr
            .iter()
            .copied()
            .chain(other.indptr[1..].iter().map(|&ptr| ptr + offset))
            .collect();

        Ok(Self {
            num_cols: self.num_cols,
            indptr,
            indices: self.indices.iter().chain(&other.indices).copied().collect(),
            data: self.data.iter().chain(&other.data).copied().collect(),
        })
    }
}
