use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{seq::index, Rng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    bbox::{ensure_boxes, inside_indices, iou_matrix},
    box_coder::BoxCoder,
    error::{Error, Result},
};

/// Labeling and sampling parameters for [`AnchorTargetAssigner`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct AnchorTargetConfig {
    /// Number of anchors to keep labeled per image.
    pub n_sample: usize,
    /// Anchors with a best IoU at or above this are foreground.
    pub pos_iou_thresh: f32,
    /// Anchors with a best IoU below this are background.
    pub neg_iou_thresh: f32,
    /// Fraction of `n_sample` reserved for foreground anchors.
    pub pos_ratio: f32,
}

impl Default for AnchorTargetConfig {
    fn default() -> AnchorTargetConfig {
        AnchorTargetConfig {
            n_sample: 256,
            pos_iou_thresh: 0.7,
            neg_iou_thresh: 0.3,
            pos_ratio: 0.5,
        }
    }
}

/// Produces per-anchor training targets for a region proposal network.
///
/// Given ground-truth boxes, a fixed anchor set and the image size, each
/// anchor receives a classification label (`1` foreground, `0` background,
/// `-1` ignore) and a regression target encoding its best-matching
/// ground-truth box. Labeled anchors are subsampled so that at most
/// `n_sample` survive, with foreground capped at `n_sample * pos_ratio`.
pub struct AnchorTargetAssigner {
    config: AnchorTargetConfig,
    coder: BoxCoder,
}

impl AnchorTargetAssigner {
    pub fn new(config: AnchorTargetConfig) -> Result<AnchorTargetAssigner> {
        if !(0.0..=1.0).contains(&config.pos_ratio) {
            return Err(Error::InvalidPosRatio {
                pos_ratio: config.pos_ratio,
            });
        }
        if config.pos_iou_thresh < config.neg_iou_thresh {
            return Err(Error::InvalidIouThresholds {
                pos: config.pos_iou_thresh,
                neg: config.neg_iou_thresh,
            });
        }

        Ok(AnchorTargetAssigner {
            config,
            coder: BoxCoder::default(),
        })
    }

    /// Assign a regression target and a label to every anchor.
    ///
    /// `gt_boxes` is `M x 4` (`M` may be zero), `anchors` is `N x 4`, both
    /// xyxy. `image_size` is `(width, height)`. Returns the `N x 4` location
    /// targets and the length-`N` labels; anchors extending outside the
    /// image keep label `-1` and a zero location target.
    ///
    /// Sampling draws from `rng`, so a seeded generator makes the result
    /// reproducible.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        gt_boxes: ArrayView2<f32>,
        anchors: ArrayView2<f32>,
        image_size: (u32, u32),
        rng: &mut R,
    ) -> Result<(Array2<f32>, Array1<i32>)> {
        ensure_boxes("gt_boxes", gt_boxes)?;
        ensure_boxes("anchors", anchors)?;

        let n_anchor = anchors.nrows();
        let (width, height) = image_size;

        let inside = inside_indices(anchors, width as f32, height as f32);
        let anchors_inside = anchors.select(Axis(0), &inside);

        let (matched_gt, mut labels) = self.label_anchors(anchors_inside.view(), gt_boxes);
        self.subsample(&mut labels, rng);

        let locs_inside = if gt_boxes.nrows() > 0 {
            let matched = gt_boxes.select(Axis(0), &matched_gt);
            self.coder
                .encode_single(anchors_inside.view(), matched.view())
        } else {
            Array2::zeros((inside.len(), 4))
        };

        // map back to the full anchor set; outside anchors stay ignored
        let mut full_labels = Array1::from_elem(n_anchor, -1);
        let mut full_locs = Array2::zeros((n_anchor, 4));
        for (k, &i) in inside.iter().enumerate() {
            full_labels[i] = labels[k];
            full_locs.row_mut(i).assign(&locs_inside.row(k));
        }

        Ok((full_locs, full_labels))
    }

    /// Label the inside anchors by IoU against the ground truth.
    ///
    /// Returns the matched ground-truth index per anchor together with the
    /// labels. Label passes run background first, then the forced positives
    /// (every anchor tying a per-ground-truth maximum, or the argmax alone
    /// when the maximum is zero), then the threshold positives, so a forced
    /// positive can still be promoted by threshold but never demoted to
    /// background.
    fn label_anchors(
        &self,
        anchors: ArrayView2<f32>,
        gt_boxes: ArrayView2<f32>,
    ) -> (Vec<usize>, Vec<i32>) {
        let n = anchors.nrows();
        let m = gt_boxes.nrows();

        if m == 0 {
            // nothing to match: every inside anchor is background
            return (Vec::new(), vec![0; n]);
        }

        let ious = iou_matrix(anchors, gt_boxes);

        let mut matched_gt = vec![0; n];
        let mut max_iou = vec![0.0_f32; n];
        for (i, row) in ious.rows().into_iter().enumerate() {
            for (j, &iou) in row.iter().enumerate() {
                if iou > max_iou[i] {
                    max_iou[i] = iou;
                    matched_gt[i] = j;
                }
            }
        }

        let mut labels = vec![-1; n];

        for (label, &iou) in labels.iter_mut().zip(&max_iou) {
            if iou < self.config.neg_iou_thresh {
                *label = 0;
            }
        }

        // every ground-truth box keeps at least one positive anchor, even
        // below the foreground threshold; ties all win, but a box with no
        // overlap at all settles for its argmax anchor alone
        for j in 0..m {
            let column = ious.column(j);

            let mut gt_max = f32::NEG_INFINITY;
            let mut gt_argmax = None;
            for (i, &iou) in column.iter().enumerate() {
                if iou > gt_max {
                    gt_max = iou;
                    gt_argmax = Some(i);
                }
            }
            let Some(gt_argmax) = gt_argmax else {
                continue;
            };

            if gt_max > 0.0 {
                for (i, &iou) in column.iter().enumerate() {
                    if iou == gt_max {
                        labels[i] = 1;
                    }
                }
            } else {
                labels[gt_argmax] = 1;
            }
        }

        for (label, &iou) in labels.iter_mut().zip(&max_iou) {
            if iou >= self.config.pos_iou_thresh {
                *label = 1;
            }
        }

        (matched_gt, labels)
    }

    /// Reset excess labeled anchors to ignore, uniformly at random.
    fn subsample<R: Rng + ?Sized>(&self, labels: &mut [i32], rng: &mut R) {
        let n_pos_cap = (self.config.pos_ratio * self.config.n_sample as f32) as usize;
        disable_excess(labels, 1, n_pos_cap, rng);

        let n_pos = labels.iter().filter(|&&l| l == 1).count();
        let n_neg_cap = self.config.n_sample.saturating_sub(n_pos);
        disable_excess(labels, 0, n_neg_cap, rng);

        trace!(
            foreground = n_pos,
            background = labels.iter().filter(|&&l| l == 0).count(),
            "sampled anchor targets"
        );
    }
}

/// Knock labeled anchors of one class back to ignore until at most `cap`
/// remain, chosen without replacement.
fn disable_excess<R: Rng + ?Sized>(labels: &mut [i32], class: i32, cap: usize, rng: &mut R) {
    let candidates: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l == class)
        .map(|(i, _)| i)
        .collect();

    if candidates.len() > cap {
        let excess = candidates.len() - cap;
        for k in index::sample(rng, candidates.len(), excess) {
            labels[candidates[k]] = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn assigner() -> AnchorTargetAssigner {
        AnchorTargetAssigner::new(AnchorTargetConfig::default()).unwrap()
    }

    #[test]
    fn rejects_malformed_boxes() {
        let gt = Array2::<f32>::zeros((2, 3));
        let anchors = Array2::<f32>::zeros((4, 4));
        let mut rng = StdRng::seed_from_u64(0);

        let result = assigner().assign(gt.view(), anchors.view(), (100, 100), &mut rng);
        assert!(matches!(
            result,
            Err(Error::MalformedBoxes { name: "gt_boxes", .. })
        ));
    }

    #[test]
    fn rejects_invalid_pos_ratio() {
        let config = AnchorTargetConfig {
            pos_ratio: 1.5,
            ..AnchorTargetConfig::default()
        };
        assert!(AnchorTargetAssigner::new(config).is_err());
    }

    #[test]
    fn every_gt_box_gets_a_foreground_anchor() {
        // neither anchor reaches the 0.7 threshold, so only the forced
        // positives can label them
        let anchors = array![
            [0.0, 0.0, 20.0, 20.0],
            [40.0, 40.0, 60.0, 60.0],
            [70.0, 70.0, 90.0, 90.0],
        ];
        let gt = array![[5.0, 5.0, 30.0, 30.0], [45.0, 38.0, 70.0, 60.0]];
        let mut rng = StdRng::seed_from_u64(7);

        let (_, labels) = assigner()
            .assign(gt.view(), anchors.view(), (100, 100), &mut rng)
            .unwrap();

        assert_eq!(labels[0], 1);
        assert_eq!(labels[1], 1);
        assert_eq!(labels[2], 0);
    }

    #[test]
    fn disjoint_gt_box_still_gets_a_foreground_anchor() {
        // the gt box overlaps no anchor, so only the forced argmax can
        // label one
        let anchors = array![[0.0, 0.0, 10.0, 10.0], [50.0, 50.0, 60.0, 60.0]];
        let gt = array![[80.0, 80.0, 95.0, 95.0]];
        let mut rng = StdRng::seed_from_u64(0);

        let (_, labels) = assigner()
            .assign(gt.view(), anchors.view(), (100, 100), &mut rng)
            .unwrap();

        assert_eq!(labels.iter().filter(|&&l| l == 1).count(), 1);
    }

    #[test]
    fn no_ground_truth_means_no_foreground() {
        let anchors = array![[0.0, 0.0, 20.0, 20.0], [40.0, 40.0, 60.0, 60.0]];
        let gt = Array2::<f32>::zeros((0, 4));
        let mut rng = StdRng::seed_from_u64(0);

        let (locs, labels) = assigner()
            .assign(gt.view(), anchors.view(), (100, 100), &mut rng)
            .unwrap();

        assert!(labels.iter().all(|&l| l == 0 || l == -1));
        assert!(locs.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn fewer_eligible_anchors_than_n_sample() {
        // only 2 inside anchors; all of them stay labeled
        let anchors = array![
            [0.0, 0.0, 20.0, 20.0],
            [40.0, 40.0, 60.0, 60.0],
            [-5.0, 0.0, 20.0, 20.0],
        ];
        let gt = array![[0.0, 0.0, 20.0, 20.0]];
        let mut rng = StdRng::seed_from_u64(0);

        let (_, labels) = assigner()
            .assign(gt.view(), anchors.view(), (100, 100), &mut rng)
            .unwrap();

        assert_eq!(labels.iter().filter(|&&l| l != -1).count(), 2);
        assert_eq!(labels[2], -1);
    }

    #[test]
    fn outside_anchors_are_ignored() {
        let anchors = array![[0.0, 0.0, 20.0, 20.0], [90.0, 90.0, 110.0, 110.0]];
        let gt = array![[0.0, 0.0, 20.0, 20.0]];
        let mut rng = StdRng::seed_from_u64(0);

        let (locs, labels) = assigner()
            .assign(gt.view(), anchors.view(), (100, 100), &mut rng)
            .unwrap();

        assert_eq!(labels[1], -1);
        assert!(locs.row(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn perfect_match_encodes_to_zero() {
        let anchors = array![[10.0, 10.0, 30.0, 30.0]];
        let gt = array![[10.0, 10.0, 30.0, 30.0]];
        let mut rng = StdRng::seed_from_u64(0);

        let (locs, labels) = assigner()
            .assign(gt.view(), anchors.view(), (100, 100), &mut rng)
            .unwrap();

        assert_eq!(labels[0], 1);
        assert!(locs.row(0).iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn config_deserializes_from_toml() {
        let config: AnchorTargetConfig =
            toml::from_str("n_sample = 128\npos_ratio = 0.25").unwrap();

        assert_eq!(config.n_sample, 128);
        assert_eq!(config.pos_ratio, 0.25);
        // unspecified fields fall back to the defaults
        assert_eq!(config.pos_iou_thresh, 0.7);
    }
}
