use itertools::iproduct;
use ndarray::{Array2, ArrayView, ArrayView2};

/// Generates the fixed anchor set for a strided feature map.
///
/// A base set of `ratios.len() * scales.len()` boxes is built once, centered
/// on a single stride cell, then translated across the feature-map grid. The
/// resulting order is row-major over cells with the base anchors innermost,
/// so each row index maps to a fixed (cell, scale, aspect) combination.
#[derive(Debug, Clone)]
pub struct AnchorGenerator {
    pub base_size: f32,
    pub ratios: Vec<f32>,
    pub scales: Vec<f32>,
    base: Array2<f32>,
}

impl AnchorGenerator {
    pub fn new(base_size: f32, ratios: Vec<f32>, scales: Vec<f32>) -> AnchorGenerator {
        let base = Self::create_anchor_base(base_size, &ratios, &scales);

        AnchorGenerator {
            base_size,
            ratios,
            scales,
            base,
        }
    }

    /// Base anchors centered on the cell spanning `[0, base_size]` in both
    /// axes, one per (ratio, scale) pair.
    ///
    /// For each pair the box has area `(base_size * scale)^2` and a
    /// height/width ratio of `ratio`.
    fn create_anchor_base(base_size: f32, ratios: &[f32], scales: &[f32]) -> Array2<f32> {
        let ctr = base_size / 2.0;

        let mut base = Array2::zeros((0, 4));
        for (ratio, scale) in iproduct!(ratios, scales) {
            let h = base_size * scale * ratio.sqrt();
            let w = base_size * scale * (1.0 / ratio).sqrt();

            base.push_row(ArrayView::from(&[
                ctr - w / 2.0,
                ctr - h / 2.0,
                ctr + w / 2.0,
                ctr + h / 2.0,
            ]))
            .unwrap();
        }

        base
    }

    pub fn anchor_base(&self) -> ArrayView2<f32> {
        self.base.view()
    }

    /// Translate the anchor base over a `feature_size` = (width, height)
    /// grid with the given stride, producing all anchors in xyxy order.
    pub fn enumerate(&self, feature_size: (usize, usize), stride: f32) -> Array2<f32> {
        let (fw, fh) = feature_size;
        let num_base = self.base.nrows();

        let mut values = Vec::with_capacity(fw * fh * num_base * 4);
        for (y, x) in iproduct!(0..fh, 0..fw) {
            let shift_x = x as f32 * stride;
            let shift_y = y as f32 * stride;

            for anchor in self.base.rows() {
                values.extend_from_slice(&[
                    anchor[0] + shift_x,
                    anchor[1] + shift_y,
                    anchor[2] + shift_x,
                    anchor[3] + shift_y,
                ]);
            }
        }

        Array2::from_shape_vec((fw * fh * num_base, 4), values).unwrap()
    }
}

impl Default for AnchorGenerator {
    /// The Faster R-CNN defaults: 16 px stride cells, three aspect ratios
    /// and three scales, nine anchors per cell.
    fn default() -> AnchorGenerator {
        AnchorGenerator::new(16.0, vec![0.5, 1.0, 2.0], vec![8.0, 16.0, 32.0])
    }
}
