use ndarray::{stack, Array2, ArrayView2, Axis};

/// Weighted center-offset / log-scale box parameterization.
///
/// `encode_single` expresses a target box relative to a reference box as
/// `(dx, dy, dw, dh)`; `decode_single` is the inverse. The same coder must
/// be used for both directions for the round trip to hold.
pub struct BoxCoder {
    pub weights: (f32, f32, f32, f32),
    pub bbox_xform_clip: f32,
}

impl BoxCoder {
    /// Create a new [`BoxCoder`] with the given weights.
    ///
    /// This will default to a `bbox_xform_clip` of `ln(1000/16)`.
    pub fn new(weights: (f32, f32, f32, f32)) -> Self {
        BoxCoder {
            weights,
            bbox_xform_clip: (1000_f32 / 16_f32).ln(),
        }
    }

    /// Create a new [`BoxCoder`] with the given weights and clipping value.
    pub fn new_with_clip(weights: (f32, f32, f32, f32), bbox_xform_clip: f32) -> Self {
        BoxCoder {
            weights,
            bbox_xform_clip,
        }
    }

    /// Encode `targets` relative to `boxes`, row by row.
    ///
    /// Reference extents are clamped to a minimum of `f32::EPSILON` so that
    /// degenerate boxes never produce non-finite codes.
    pub fn encode_single(&self, boxes: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        let widths = &boxes.column(2) - &boxes.column(0);
        let heights = &boxes.column(3) - &boxes.column(1);

        let ctr_x = &boxes.column(0) + &widths / 2.0;
        let ctr_y = &boxes.column(1) + &heights / 2.0;

        let widths = widths.mapv(|w| w.max(f32::EPSILON));
        let heights = heights.mapv(|h| h.max(f32::EPSILON));

        let target_widths =
            (&targets.column(2) - &targets.column(0)).mapv(|w| w.max(f32::EPSILON));
        let target_heights =
            (&targets.column(3) - &targets.column(1)).mapv(|h| h.max(f32::EPSILON));

        let target_ctr_x = &targets.column(0) + &target_widths / 2.0;
        let target_ctr_y = &targets.column(1) + &target_heights / 2.0;

        let (wx, wy, ww, wh) = self.weights;

        let dx = (target_ctr_x - ctr_x) / &widths * wx;
        let dy = (target_ctr_y - ctr_y) / &heights * wy;
        let dw = (target_widths / widths).mapv(|r| r.ln()) * ww;
        let dh = (target_heights / heights).mapv(|r| r.ln()) * wh;

        stack![Axis(1), dx, dy, dw, dh]
    }

    /// Apply `codes` to `boxes`, producing the decoded boxes in xyxy order.
    pub fn decode_single(&self, codes: ArrayView2<f32>, boxes: ArrayView2<f32>) -> Array2<f32> {
        let widths = &boxes.column(2) - &boxes.column(0);
        let heights = &boxes.column(3) - &boxes.column(1);

        let ctr_x = &boxes.column(0) + &widths / 2.0;
        let ctr_y = &boxes.column(1) + &heights / 2.0;

        let (wx, wy, ww, wh) = self.weights;

        let dx = &codes.column(0) / wx;
        let dy = &codes.column(1) / wy;
        let dw = &codes.column(2) / ww;
        let dh = &codes.column(3) / wh;

        // clamp to avoid overflow in exp
        let dw = dw.mapv(|x| x.min(self.bbox_xform_clip));
        let dh = dh.mapv(|x| x.min(self.bbox_xform_clip));

        let pred_ctr_x = dx * &widths + ctr_x;
        let pred_ctr_y = dy * &heights + ctr_y;

        let pred_w = dw.mapv(|x| x.exp()) * widths;
        let pred_h = dh.mapv(|x| x.exp()) * heights;

        let c_to_c_w = pred_w / 2.0;
        let c_to_c_h = pred_h / 2.0;

        let x1 = &pred_ctr_x - &c_to_c_w;
        let y1 = &pred_ctr_y - &c_to_c_h;
        let x2 = &pred_ctr_x + &c_to_c_w;
        let y2 = &pred_ctr_y + &c_to_c_h;

        stack![Axis(1), x1, y1, x2, y2]
    }
}

impl Default for BoxCoder {
    fn default() -> Self {
        BoxCoder::new((1.0, 1.0, 1.0, 1.0))
    }
}
