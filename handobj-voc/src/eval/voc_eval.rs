use super::*;
use crate::{
    common::*,
    dataset::{
        load_or_build, parse_annotation_file, read_image_set_file, Annotation, ObjectAnnotation,
        TARGET_OBJECT_CLASS,
    },
};

/// Scale restoring the predicted contact vector length to pixels.
const CONTACT_VECTOR_SCALE: f32 = 1000.0;

/// The built-in VOC scorer.
///
/// Detections are matched greedily by descending confidence. A detection is
/// a true positive when its best IoU with an unmatched ground truth box of
/// the class exceeds the threshold.
#[derive(Debug, Clone, Default)]
pub struct VocScorer;

impl VocScorer {
    pub fn new() -> Self {
        Self
    }

    /// Load the annotations of every image in the split, keyed in split order.
    ///
    /// The parsed annotations are cached at
    /// `<cache_dir>/<image_set_stem>_annots.pkl` and reused without reading
    /// the annotation files again.
    pub fn load_annotations(&self, request: &ScoreRequest) -> Result<IndexMap<String, Annotation>> {
        let keys = read_image_set_file(&request.image_set_file)?;
        let stem = request
            .image_set_file
            .file_stem()
            .ok_or_else(|| {
                format_err!(
                    "invalid image set file '{}'",
                    request.image_set_file.display()
                )
            })?
            .to_string_lossy();
        let cache_file = request.cache_dir.join(format!("{}_annots.pkl", stem));

        load_or_build(&cache_file, || {
            keys.iter()
                .map(|key| -> Result<_> {
                    let annotation = parse_annotation_file(request.annotation_path(key))?;
                    Ok((key.clone(), annotation))
                })
                .try_collect()
        })
    }

    fn score<F>(&self, request: &ScoreRequest, mut accept: F) -> Result<PrCurve>
    where
        F: FnMut(&str, &DetectionRow, &ObjectAnnotation) -> bool,
    {
        let annotations = self.load_annotations(request)?;
        let mut records = ClassRecords::new(&annotations, &request.class_name, request.use_diff);

        let mut detections = read_results_file(request.results_file())?;
        detections.sort_by(|(_, lhs), (_, rhs)| {
            rhs.score
                .partial_cmp(&lhs.score)
                .unwrap_or(Ordering::Equal)
        });

        let is_tp: Vec<bool> = detections
            .iter()
            .map(|(key, det)| -> Result<_> {
                let image = records.images.get_mut(key.as_str()).ok_or_else(|| {
                    format_err!("detection on image '{}' which is not in the split", key)
                })?;

                // results files hold 1-based boxes, the same as annotations
                let det_box = det.bbox.shift(1.0);
                let best = image
                    .objects
                    .iter()
                    .enumerate()
                    .map(|(index, object)| (index, det_box.iou_with(&object.bbox)))
                    .fold(None, |best: Option<(usize, f32)>, (index, iou)| match best {
                        Some((_, best_iou)) if best_iou >= iou => best,
                        _ => Some((index, iou)),
                    });

                let is_tp = match best {
                    Some((index, ovmax))
                        if ovmax as f64 > request.iou_threshold
                            && accept(key.as_str(), det, image.objects[index]) =>
                    {
                        if image.difficult[index] {
                            None
                        } else if !image.detected[index] {
                            image.detected[index] = true;
                            Some(true)
                        } else {
                            Some(false)
                        }
                    }
                    _ => Some(false),
                };
                Ok(is_tp)
            })
            .filter_map(|result| result.transpose())
            .try_collect()?;

        let curve = ApCalculator::prec_rec_curve(is_tp, records.npos);
        let ap = ApCalculator::new(request.metric.integral_method())?.compute_by_prec_rec(&curve);

        Ok(PrCurve {
            rec: curve.iter().map(|point| point.recall.raw()).collect(),
            prec: curve.iter().map(|point| point.precision.raw()).collect(),
            ap: ap.raw(),
        })
    }
}

impl ApScorer for VocScorer {
    fn voc_eval(&self, request: &ScoreRequest) -> Result<PrCurve> {
        self.score(request, |_, _, _| true)
    }

    fn voc_eval_hand(
        &self,
        request: &ScoreRequest,
        constraint: HandConstraint,
    ) -> Result<PrCurve> {
        let objects = if matches!(constraint, HandConstraint::ObjectBbox | HandConstraint::All) {
            let path = request.results.path_for(TARGET_OBJECT_CLASS);
            read_results_file(&path)?.into_iter().into_group_map()
        } else {
            HashMap::new()
        };

        self.score(request, |key, det, gt| {
            let state_ok = || det.contact_state_code() == gt.hand.contact_state;
            let side_ok = || ((det.attributes.hand_side > 0.5) as i32) == gt.hand.hand_side;
            let object_ok = || {
                let candidates = objects.get(key).map(|dets| dets.as_slice()).unwrap_or(&[]);
                contact_object_matches(det, gt, candidates, request.iou_threshold)
            };

            match constraint {
                HandConstraint::HandState => state_ok(),
                HandConstraint::HandSide => side_ok(),
                HandConstraint::ObjectBbox => object_ok(),
                HandConstraint::All => state_ok() && side_ok() && object_ok(),
            }
        })
    }
}

/// Check the predicted contact of a hand detection against its ground truth.
///
/// A hand in contact with an annotated object must be predicted in contact,
/// and the object detection nearest to the point the hand points at must
/// overlap the annotated object box. A hand not in contact must be predicted
/// without contact.
pub fn contact_object_matches(
    det: &DetectionRow,
    gt: &ObjectAnnotation,
    object_dets: &[DetectionRow],
    iou_threshold: f64,
) -> bool {
    let det_in_contact = det.contact_state_code() > 0;

    match (gt.hand.contact_state > 0, &gt.contact_object) {
        (true, Some(gt_object)) => {
            if !det_in_contact {
                return false;
            }
            match predict_contact_object(det, object_dets) {
                Some(object) => {
                    object.bbox.shift(1.0).iou_with(gt_object) as f64 >= iou_threshold
                }
                None => false,
            }
        }
        (true, None) => det_in_contact,
        (false, _) => !det_in_contact,
    }
}

/// The object detection whose center is closest to where the hand points.
pub fn predict_contact_object<'a>(
    hand: &DetectionRow,
    object_dets: &'a [DetectionRow],
) -> Option<&'a DetectionRow> {
    let [cx, cy] = hand.bbox.center();
    let attrs = &hand.attributes;
    let length = attrs.magnitude * CONTACT_VECTOR_SCALE;
    let target = [cx + length * attrs.unit_dx, cy + length * attrs.unit_dy];

    object_dets
        .iter()
        .map(|object| {
            let [ox, oy] = object.bbox.center();
            let dist = (ox - target[0]).powi(2) + (oy - target[1]).powi(2);
            (object, r32(dist))
        })
        .min_by_key(|(_, dist)| *dist)
        .map(|(object, _)| object)
}

/// Ground truth objects of one class in one image.
#[derive(Debug)]
struct ImageObjects<'a> {
    objects: Vec<&'a ObjectAnnotation>,
    difficult: Vec<bool>,
    detected: Vec<bool>,
}

#[derive(Debug)]
struct ClassRecords<'a> {
    images: HashMap<&'a str, ImageObjects<'a>>,
    npos: usize,
}

impl<'a> ClassRecords<'a> {
    fn new(
        annotations: &'a IndexMap<String, Annotation>,
        class_name: &str,
        use_diff: bool,
    ) -> Self {
        let mut npos = 0;
        let images = annotations
            .iter()
            .map(|(key, annotation)| {
                let objects: Vec<_> = annotation
                    .objects
                    .iter()
                    .filter(|object| object.class_name == class_name)
                    .collect();
                let difficult: Vec<_> = objects
                    .iter()
                    .map(|object| !use_diff && object.difficult != 0)
                    .collect();
                npos += difficult.iter().filter(|&&difficult| !difficult).count();
                let detected = vec![false; objects.len()];

                (
                    key.as_str(),
                    ImageObjects {
                        objects,
                        difficult,
                        detected,
                    },
                )
            })
            .collect();

        Self { images, npos }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::HandAttributes;

    fn hand_det(xyxy: [f32; 4], state: f32, magnitude: f32, dx: f32, dy: f32) -> DetectionRow {
        DetectionRow::new(
            xyxy,
            0.9,
            DetectionAttributes {
                contact_state: state,
                magnitude,
                unit_dx: dx,
                unit_dy: dy,
                hand_side: 1.0,
            },
        )
        .unwrap()
    }

    fn object_det(xyxy: [f32; 4]) -> DetectionRow {
        DetectionRow::new(xyxy, 0.8, Default::default()).unwrap()
    }

    fn gt_hand(state: i32, contact_object: Option<[f32; 4]>) -> ObjectAnnotation {
        ObjectAnnotation {
            class_name: "hand".into(),
            class_index: 2,
            bbox: XYXY::try_from_xyxy([1.0, 1.0, 11.0, 11.0]).unwrap(),
            difficult: 0,
            hand: HandAttributes {
                contact_state: state,
                ..Default::default()
            },
            contact_object: contact_object.map(|xyxy| XYXY::try_from_xyxy(xyxy).unwrap()),
        }
    }

    #[test]
    fn nearest_object_to_pointed_location() {
        // center (5, 5), points 0.05 * 1000 = 50 pixels to the right
        let hand = hand_det([0.0, 0.0, 10.0, 10.0], 3.0, 0.05, 1.0, 0.0);
        let objects = vec![
            object_det([0.0, 0.0, 10.0, 10.0]),
            object_det([50.0, 0.0, 60.0, 10.0]),
            object_det([100.0, 0.0, 110.0, 10.0]),
        ];
        let object = predict_contact_object(&hand, &objects).unwrap();
        assert_eq!(object.bbox.xyxy(), [50.0, 0.0, 60.0, 10.0]);
        assert!(predict_contact_object(&hand, &[]).is_none());
    }

    #[test]
    fn contact_object_rules() {
        let hand = hand_det([0.0, 0.0, 10.0, 10.0], 3.0, 0.05, 1.0, 0.0);
        let objects = vec![object_det([50.0, 0.0, 60.0, 10.0])];

        // the gt object box is 1-based
        let gt = gt_hand(3, Some([51.0, 1.0, 61.0, 11.0]));
        assert!(contact_object_matches(&hand, &gt, &objects, 0.5));
        assert!(!contact_object_matches(&hand, &gt, &[], 0.5));

        let far = gt_hand(3, Some([151.0, 1.0, 161.0, 11.0]));
        assert!(!contact_object_matches(&hand, &far, &objects, 0.5));

        let no_contact = gt_hand(0, None);
        assert!(!contact_object_matches(&hand, &no_contact, &objects, 0.5));
        let idle = hand_det([0.0, 0.0, 10.0, 10.0], 0.0, 0.0, 0.0, 0.0);
        assert!(contact_object_matches(&idle, &no_contact, &objects, 0.5));
        assert!(!contact_object_matches(&idle, &gt, &objects, 0.5));
    }
}
