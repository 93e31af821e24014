use crate::common::*;

/// Attribute columns predicted along with a box.
///
/// Only hand detections carry meaningful values. Other classes leave them zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionAttributes {
    /// Discrete contact state code.
    pub contact_state: f32,
    pub magnitude: f32,
    pub unit_dx: f32,
    pub unit_dy: f32,
    /// Hand side score, above 0.5 means right hand.
    pub hand_side: f32,
}

/// A detected box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRow {
    /// 0-based box.
    pub bbox: XYXY<f32>,
    pub score: f32,
    pub attributes: DetectionAttributes,
}

impl DetectionRow {
    pub fn new(bbox: [f32; 4], score: f32, attributes: DetectionAttributes) -> Result<Self> {
        ensure!(score.is_finite(), "detection score must be finite");
        Ok(Self {
            bbox: XYXY::try_from_xyxy(bbox)?,
            score,
            attributes,
        })
    }

    /// Build from the 10 column network output layout
    /// `x1 y1 x2 y2 score state magnitude dx dy side`.
    pub fn from_slice(row: &[f32]) -> Result<Self> {
        match *row {
            [x1, y1, x2, y2, score, contact_state, magnitude, unit_dx, unit_dy, hand_side] => {
                Self::new(
                    [x1, y1, x2, y2],
                    score,
                    DetectionAttributes {
                        contact_state,
                        magnitude,
                        unit_dx,
                        unit_dy,
                        hand_side,
                    },
                )
            }
            _ => bail!("expect 10 columns in a detection row, but get {}", row.len()),
        }
    }

    /// The contact state as an integer code.
    pub fn contact_state_code(&self) -> i32 {
        self.attributes.contact_state.trunc() as i32
    }
}

/// Detections of a split, indexed by `[class][image]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionBatch {
    all_boxes: Vec<Vec<Vec<DetectionRow>>>,
}

impl DetectionBatch {
    pub fn new(num_classes: usize, num_images: usize) -> Self {
        Self {
            all_boxes: vec![vec![vec![]; num_images]; num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.all_boxes.len()
    }

    pub fn num_images(&self) -> usize {
        self.all_boxes.first().map(|images| images.len()).unwrap_or(0)
    }

    pub fn get(&self, class_index: usize, image_index: usize) -> &[DetectionRow] {
        &self.all_boxes[class_index][image_index]
    }

    pub fn set(
        &mut self,
        class_index: usize,
        image_index: usize,
        rows: Vec<DetectionRow>,
    ) -> Result<()> {
        let slot = self
            .all_boxes
            .get_mut(class_index)
            .and_then(|images| images.get_mut(image_index))
            .ok_or_else(|| {
                format_err!(
                    "detection slot ({}, {}) is out of bound",
                    class_index,
                    image_index
                )
            })?;
        *slot = rows;
        Ok(())
    }

    pub fn push(
        &mut self,
        class_index: usize,
        image_index: usize,
        row: DetectionRow,
    ) -> Result<()> {
        let slot = self
            .all_boxes
            .get_mut(class_index)
            .and_then(|images| images.get_mut(image_index))
            .ok_or_else(|| {
                format_err!(
                    "detection slot ({}, {}) is out of bound",
                    class_index,
                    image_index
                )
            })?;
        slot.push(row);
        Ok(())
    }

    /// Detections of one class, in image order.
    pub fn class_detections(&self, class_index: usize) -> &[Vec<DetectionRow>] {
        &self.all_boxes[class_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_from_slice() {
        let row = DetectionRow::from_slice(&[
            10.0, 20.0, 30.0, 40.0, 0.9, 3.0, 0.12, 0.6, -0.8, 0.7,
        ])
        .unwrap();
        assert_eq!(row.bbox.xyxy(), [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(row.score, 0.9);
        assert_eq!(row.contact_state_code(), 3);
        assert_eq!(row.attributes.hand_side, 0.7);

        assert!(DetectionRow::from_slice(&[1.0, 2.0, 3.0]).is_err());
        assert!(DetectionRow::from_slice(&[
            10.0, 20.0, 5.0, 40.0, 0.9, 0.0, 0.0, 0.0, 0.0, 0.0
        ])
        .is_err());
    }

    #[test]
    fn batch_slots() {
        let mut batch = DetectionBatch::new(3, 2);
        assert_eq!(batch.num_classes(), 3);
        assert_eq!(batch.num_images(), 2);

        let row = DetectionRow::new([0.0, 0.0, 1.0, 1.0], 0.5, Default::default()).unwrap();
        batch.push(2, 1, row.clone()).unwrap();
        assert_eq!(batch.get(2, 1), [row]);
        assert!(batch.get(2, 0).is_empty());
        let outside = DetectionRow::new([0.0; 4], 0.1, Default::default()).unwrap();
        assert!(batch.push(3, 0, outside).is_err());
    }
}
