//! Axis-aligned bounding box utilities.
//!
//! Boxes are rows of an `N x 4` array in `(x_min, y_min, x_max, y_max)`
//! order. Row order is meaningful and preserved by every function here.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

type BBox = (f32, f32, f32, f32);

fn as_bbox(row: ArrayView1<f32>) -> BBox {
    (row[0], row[1], row[2], row[3])
}

pub fn intersection(box1: &BBox, box2: &BBox) -> f32 {
    let x1 = box1.0.max(box2.0);
    let y1 = box1.1.max(box2.1);
    let x2 = box1.2.min(box2.2);
    let y2 = box1.3.min(box2.3);

    if x2 < x1 || y2 < y1 {
        0.0
    } else {
        (x2 - x1) * (y2 - y1)
    }
}

fn union(box1: &BBox, box2: &BBox) -> f32 {
    let area1 = (box1.2 - box1.0) * (box1.3 - box1.1);
    let area2 = (box2.2 - box2.0) * (box2.3 - box2.1);
    area1 + area2 - intersection(box1, box2)
}

pub fn iou(box1: &BBox, box2: &BBox) -> f32 {
    let intersect = intersection(box1, box2);
    let union = union(box1, box2);

    if union <= 0.0 {
        0.0
    } else {
        intersect / union
    }
}

/// Validate that `boxes` has 4 columns.
///
/// `name` identifies the offending argument in the error.
pub fn ensure_boxes(name: &'static str, boxes: ArrayView2<f32>) -> Result<()> {
    if boxes.ncols() == 4 {
        Ok(())
    } else {
        Err(Error::MalformedBoxes {
            name,
            columns: boxes.ncols(),
        })
    }
}

/// Pairwise IoU between every box in `a` and every box in `b`.
///
/// Returns an `a.nrows() x b.nrows()` matrix. Either input may be empty,
/// in which case the matching dimension of the result is zero.
pub fn iou_matrix(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32> {
    let mut ious = Array2::zeros((a.nrows(), b.nrows()));

    for (i, row_a) in a.rows().into_iter().enumerate() {
        let box_a = as_bbox(row_a);
        for (j, row_b) in b.rows().into_iter().enumerate() {
            ious[[i, j]] = iou(&box_a, &as_bbox(row_b));
        }
    }

    ious
}

/// Indices of boxes lying fully inside `[0, width] x [0, height]`.
pub fn inside_indices(boxes: ArrayView2<f32>, width: f32, height: f32) -> Vec<usize> {
    boxes
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| row[0] >= 0.0 && row[1] >= 0.0 && row[2] <= width && row[3] <= height)
        .map(|(i, _)| i)
        .collect()
}
