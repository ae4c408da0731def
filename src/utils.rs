// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Geometry helpers and non-maximum suppression.

use crate::results::{BoundingBox, Detection};

/// Logistic sigmoid.
#[must_use]
pub fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Clamp `value` into `[min, max]`.
///
/// Unlike [`f32::clamp`] this never panics when `min > max`; the lower bound
/// is checked first.
#[must_use]
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Convert a center-based `[cx, cy, w, h]` box into corners `[x1, y1, x2, y2]`.
#[must_use]
pub fn xywh_to_xyxy(xywh: [f32; 4]) -> [f32; 4] {
    let [cx, cy, w, h] = xywh;
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// Calculate `IoU` (Intersection over Union) between two bounding boxes
///
/// # Returns
///
/// `IoU` value between 0.0 and 1.0. Degenerate inputs (zero-area union,
/// non-finite coordinates) yield 0.0.
#[must_use]
pub fn calculate_iou(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let x1 = box1.x_min.max(box2.x_min);
    let y1 = box1.y_min.max(box2.y_min);
    let x2 = box1.x_max.min(box2.x_max);
    let y2 = box1.y_max.min(box2.y_max);

    let intersection = ((x2 - x1).max(0.0)) * ((y2 - y1).max(0.0));
    let union = box1.area() + box2.area() - intersection;

    if union > 0.0 {
        let iou = intersection / union;
        if iou.is_finite() { iou } else { 0.0 }
    } else {
        0.0
    }
}

/// Greedy suppression in candidate order.
///
/// Every candidate still present is compared against every other candidate
/// still present; when their `IoU` reaches `overlap` the lower-scoring one is
/// removed, and on equal scores the one visited by the inner loop goes. A
/// removed candidate takes no further part. Suppression is label-agnostic and
/// survivors keep their original relative order, so the result depends on the
/// order candidates were discovered in.
#[must_use]
pub fn suppress(candidates: Vec<Detection>, overlap: f32) -> Vec<Detection> {
    let count = candidates.len();
    let mut present = vec![true; count];

    for item in 0..count {
        if !present[item] {
            continue;
        }

        for current in 0..count {
            if current == item || !present[current] {
                continue;
            }

            let iou = calculate_iou(&candidates[item].bbox, &candidates[current].bbox);
            if iou >= overlap {
                if candidates[item].score >= candidates[current].score {
                    present[current] = false;
                } else {
                    present[item] = false;
                    break;
                }
            }
        }
    }

    candidates
        .into_iter()
        .zip(present)
        .filter_map(|(det, keep)| keep.then_some(det))
        .collect()
}

/// Non-Maximum Suppression (NMS) over score-sorted candidates.
///
/// Candidates are visited from highest to lowest score (stable for ties);
/// each kept box suppresses every later box with `IoU >= overlap`. Output is
/// sorted by descending score.
#[must_use]
pub fn nms(candidates: Vec<Detection>, overlap: f32) -> Vec<Detection> {
    if candidates.is_empty() {
        return vec![];
    }

    // Sort by score (descending)
    let mut indices: Vec<usize> = (0..candidates.len()).collect();
    indices.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));

    let mut keep = vec![];
    let mut suppressed = vec![false; candidates.len()];

    for (pos, &i) in indices.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &indices[pos + 1..] {
            if !suppressed[j] && calculate_iou(&candidates[i].bbox, &candidates[j].bbox) >= overlap
            {
                suppressed[j] = true;
            }
        }
    }

    let mut slots: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Simple pluralization for common COCO class names.
#[must_use]
pub fn pluralize(word: &str) -> String {
    match word {
        "person" => "persons".to_string(),
        "bus" => "buses".to_string(),
        "knife" => "knives".to_string(),
        "mouse" => "mice".to_string(),
        "sheep" => "sheep".to_string(),
        "skis" => "skis".to_string(),
        _ => {
            if word.ends_with('s') || word.ends_with("ch") || word.ends_with("sh") {
                format!("{word}es")
            } else if word.ends_with('y') && !word.ends_with("ey") && !word.ends_with("ay") {
                format!("{}ies", &word[..word.len() - 1])
            } else {
                format!("{word}s")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Label;

    fn det(id: usize, score: f32, xyxy: [f32; 4]) -> Detection {
        Detection::new(Label::new(id, format!("c{id}")), score, BoundingBox::from_xyxy(xyxy))
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }

    #[test]
    fn test_clamp_asymmetric_bounds() {
        assert!((clamp(-5.0, 0.0, 10.0)).abs() < f32::EPSILON);
        assert!((clamp(15.0, 0.0, 9.0) - 9.0).abs() < f32::EPSILON);
        assert!((clamp(4.5, 0.0, 9.0) - 4.5).abs() < f32::EPSILON);
        // lower bound wins when the range is empty
        assert!((clamp(-1.0, 0.0, -1.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_xywh_to_xyxy() {
        assert_eq!(
            xywh_to_xyxy([320.0, 320.0, 100.0, 50.0]),
            [270.0, 295.0, 370.0, 345.0]
        );
    }

    #[test]
    fn test_calculate_iou() {
        let box1 = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let box2 = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let iou = calculate_iou(&box1, &box2);
        assert!((iou - 0.142_857).abs() < 0.001); // 25 / (100 + 100 - 25)
    }

    #[test]
    fn test_iou_degenerate_is_zero() {
        let point = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        assert!(calculate_iou(&point, &point).abs() < f32::EPSILON);

        let nan = BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0);
        assert!(calculate_iou(&nan, &point).abs() < f32::EPSILON);
    }

    #[test]
    fn test_suppress_tie_keeps_first() {
        let a = det(0, 0.8, [0.0, 0.0, 10.0, 10.0]);
        let b = det(1, 0.8, [0.0, 0.0, 10.0, 10.0]);
        let kept = suppress(vec![a.clone(), b], 0.45);
        assert_eq!(kept, vec![a]);
    }

    #[test]
    fn test_suppress_removes_lower_score() {
        let low = det(0, 0.5, [0.0, 0.0, 10.0, 10.0]);
        let high = det(0, 0.9, [1.0, 1.0, 11.0, 11.0]);
        let far = det(2, 0.3, [100.0, 100.0, 110.0, 110.0]);
        let kept = suppress(vec![low, high.clone(), far.clone()], 0.5);
        assert_eq!(kept, vec![high, far]);
    }

    #[test]
    fn test_suppress_is_label_agnostic() {
        let a = det(0, 0.9, [0.0, 0.0, 10.0, 10.0]);
        let b = det(5, 0.7, [0.0, 0.0, 10.0, 10.0]);
        assert_eq!(suppress(vec![a, b], 0.5).len(), 1);
    }

    #[test]
    fn test_suppress_threshold_is_inclusive() {
        // IoU of these two is exactly 0.5
        let a = det(0, 0.9, [0.0, 0.0, 10.0, 10.0]);
        let b = det(0, 0.8, [0.0, 0.0, 10.0, 5.0]);
        assert_eq!(suppress(vec![a.clone(), b.clone()], 0.5).len(), 1);
        assert_eq!(suppress(vec![a, b], 0.51).len(), 2);
    }

    #[test]
    fn test_suppress_overlap_chain() {
        // a overlaps b, b overlaps c, a does not overlap c
        let a = det(0, 0.6, [0.0, 0.0, 10.0, 10.0]);
        let b = det(0, 0.9, [2.0, 0.0, 12.0, 10.0]);
        let c = det(0, 0.7, [4.0, 0.0, 14.0, 10.0]);
        let c_far = det(0, 0.7, [8.0, 0.0, 18.0, 10.0]);

        let kept = suppress(vec![a.clone(), b.clone(), c], 0.5);
        assert_eq!(kept, vec![b.clone()]);

        let kept = suppress(vec![a, b.clone(), c_far.clone()], 0.5);
        assert_eq!(kept, vec![b, c_far]);
    }

    #[test]
    fn test_suppress_idempotent() {
        let boxes = vec![
            det(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
            det(1, 0.8, [1.0, 1.0, 11.0, 11.0]),
            det(2, 0.85, [3.0, 3.0, 13.0, 13.0]),
            det(3, 0.6, [50.0, 50.0, 60.0, 60.0]),
            det(4, 0.6, [52.0, 50.0, 62.0, 60.0]),
        ];
        let once = suppress(boxes, 0.45);
        let twice = suppress(once.clone(), 0.45);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_suppress_empty() {
        assert!(suppress(vec![], 0.45).is_empty());
    }

    #[test]
    fn test_nms() {
        let boxes = vec![
            det(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
            det(0, 0.8, [1.0, 1.0, 11.0, 11.0]),
            det(0, 0.95, [100.0, 100.0, 110.0, 110.0]),
        ];
        let keep = nms(boxes, 0.5);
        assert_eq!(keep.len(), 2);
        assert!((keep[0].score - 0.95).abs() < f32::EPSILON);
        assert!((keep[1].score - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_nms_tie_keeps_first() {
        let a = det(0, 0.8, [0.0, 0.0, 10.0, 10.0]);
        let b = det(1, 0.8, [0.0, 0.0, 10.0, 10.0]);
        assert_eq!(nms(vec![a.clone(), b], 0.45), vec![a]);
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("person"), "persons");
        assert_eq!(pluralize("bus"), "buses");
        assert_eq!(pluralize("teddy bear"), "teddy bears");
        assert_eq!(pluralize("butterfly"), "butterflies");
    }
}
