use crate::{annotation::GroundTruth, coder::BoxCoder, common::*};

#[derive(Debug, Clone)]
pub struct TargetMatcherInit {
    pub overlap_threshold: R64,
    pub coder: BoxCoder,
}

impl TargetMatcherInit {
    pub fn build(self) -> Result<TargetMatcher> {
        let Self {
            overlap_threshold,
            coder,
        } = self;
        let overlap_threshold = overlap_threshold.raw();

        ensure!(
            overlap_threshold > 0.0 && overlap_threshold <= 1.0,
            "overlap_threshold must be in range (0, 1], got {}",
            overlap_threshold
        );

        Ok(TargetMatcher {
            overlap_threshold,
            coder,
        })
    }
}

/// Assigns anchors to ground truth objects for one image.
#[derive(Debug, Clone)]
pub struct TargetMatcher {
    overlap_threshold: f64,
    coder: BoxCoder,
}

/// Per-anchor regression and classification targets for one image.
#[derive(Debug, TensorLike)]
pub struct MatchedTargets {
    /// Encoded box offsets in shape `[num_anchors, 4]`.
    pub loc: Tensor,
    /// Confidence targets in shape `[num_anchors]` of int64, 0 for background.
    pub conf: Tensor,
    /// Encoded landmark offsets in shape `[num_anchors, 10]`.
    pub landm: Tensor,
}

impl TargetMatcher {
    /// Assign each anchor to its best overlapping ground truth object, or to
    /// background when the best overlap falls below the threshold.
    ///
    /// Every object claims its best anchor even below the threshold. When two
    /// objects elect the same anchor, the object with the larger index keeps
    /// it; the assignment is deterministic given the inputs.
    pub fn match_image(
        &self,
        truth: &GroundTruth,
        anchors: &CyCxHWTensor,
    ) -> Result<MatchedTargets> {
        let device = anchors.device();
        let num_anchors = anchors.num_samples();

        ensure!(truth.device() == device, "device mismatch");

        if truth.num_objects() == 0 {
            return Ok(MatchedTargets {
                loc: Tensor::zeros(&[num_anchors, 4], (Kind::Float, device)),
                conf: Tensor::zeros(&[num_anchors], (Kind::Int64, device)),
                landm: Tensor::zeros(&[num_anchors, 10], (Kind::Float, device)),
            });
        }

        let anchor_corners = TlbrTensor::from(anchors);
        let overlaps = truth.boxes().pairwise_iou_with(&anchor_corners);

        let (best_anchor_overlap, best_anchor_index) = overlaps.max_dim(1, false);
        let (best_truth_overlap, best_truth_index) = overlaps.max_dim(0, false);

        let best_anchor_overlap = Vec::<f32>::from(&best_anchor_overlap.to_kind(Kind::Float));
        let best_anchor_index = Vec::<i64>::from(&best_anchor_index);
        let mut assigned_object = Vec::<i64>::from(&best_truth_index);
        let mut assigned_overlap = Vec::<f32>::from(&best_truth_overlap.to_kind(Kind::Float));

        // Every object claims its best anchor; the raised overlap keeps the
        // forced anchor out of the background set.
        for (object_index, (&anchor_index, &overlap)) in
            izip!(&best_anchor_index, &best_anchor_overlap).enumerate()
        {
            if (overlap as f64) < self.overlap_threshold {
                warn!(
                    "object {} overlaps its best anchor by only {:.3}, below the threshold {:.3}",
                    object_index, overlap, self.overlap_threshold
                );
            }
            assigned_object[anchor_index as usize] = object_index as i64;
            assigned_overlap[anchor_index as usize] = 2.0;
        }

        let assigned_object = Tensor::of_slice(&assigned_object).to_device(device);
        let background: Vec<bool> = assigned_overlap
            .iter()
            .map(|&overlap| (overlap as f64) < self.overlap_threshold)
            .collect();
        let background = Tensor::of_slice(&background).to_device(device);

        let conf = truth
            .labels()
            .index_select(0, &assigned_object)
            .masked_fill(&background, 0);

        let matched_boxes = truth.boxes().index_select(&assigned_object);
        let matched_landmarks = truth.landmarks().index_select(0, &assigned_object);

        let loc = self.coder.encode(&matched_boxes, anchors)?;
        let landm = self.coder.encode_landmarks(&matched_landmarks, anchors)?;

        Ok(MatchedTargets { loc, conf, landm })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::GroundTruthUnchecked;

    fn tlbr(rows: &[[f32; 4]]) -> Result<TlbrTensor> {
        let column = |index: usize| {
            let values: Vec<f32> = rows.iter().map(|row| row[index]).collect();
            Tensor::of_slice(&values).view([-1, 1])
        };
        TlbrTensorUnchecked {
            t: column(0),
            l: column(1),
            b: column(2),
            r: column(3),
        }
        .try_into()
    }

    fn anchors(rows: &[[f32; 4]]) -> Result<CyCxHWTensor> {
        Ok(CyCxHWTensor::from(&tlbr(rows)?))
    }

    fn truth(boxes: &[[f32; 4]], landmarks: &[f32], labels: &[i64]) -> Result<GroundTruth> {
        let column = |index: usize| {
            let values: Vec<f32> = boxes.iter().map(|row| row[index]).collect();
            Tensor::of_slice(&values).view([-1, 1])
        };
        GroundTruthUnchecked {
            boxes: TlbrTensorUnchecked {
                t: column(0),
                l: column(1),
                b: column(2),
                r: column(3),
            },
            landmarks: Tensor::of_slice(landmarks).view([-1, 10]),
            labels: Tensor::of_slice(labels),
        }
        .try_into()
    }

    fn matcher(overlap_threshold: f64) -> Result<TargetMatcher> {
        TargetMatcherInit {
            overlap_threshold: r64(overlap_threshold),
            coder: BoxCoder::new(0.1, 0.2)?,
        }
        .build()
    }

    #[test]
    fn below_threshold_object_claims_its_best_anchor() -> Result<()> {
        let matcher = matcher(0.35)?;
        let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [0.0, 10.0, 10.0, 20.0]])?;
        // overlaps anchor 0 by IoU 0.2, anchor 1 not at all
        let truth = truth(&[[0.0, 0.0, 5.0, 4.0]], &[2.0; 10], &[1])?;

        let targets = matcher.match_image(&truth, &anchors)?;
        let expect = Tensor::of_slice(&[1i64, 0]);
        ensure!(
            bool::from(targets.conf.eq_tensor(&expect).all()),
            "expect the forced anchor to carry the object label"
        );
        Ok(())
    }

    #[test]
    fn forced_assignment_overrides_best_overlap() -> Result<()> {
        let matcher = matcher(0.35)?;
        let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [0.0, 10.0, 10.0, 20.0]])?;
        // anchor 1 overlaps object 0 (IoU 0.3) more than object 1 (IoU 0.2),
        // but object 1 elects anchor 1 as its best and must keep it
        let truth = truth(
            &[[0.0, 0.0, 10.0, 16.0], [0.0, 10.0, 5.0, 14.0]],
            &[3.0; 20],
            &[1, 2],
        )?;

        let targets = matcher.match_image(&truth, &anchors)?;
        let expect = Tensor::of_slice(&[1i64, 2]);
        ensure!(
            bool::from(targets.conf.eq_tensor(&expect).all()),
            "expect the forced assignment to win over the anchor's own best overlap"
        );
        Ok(())
    }

    #[test]
    fn exact_match_encodes_zero_offsets() -> Result<()> {
        let matcher = matcher(0.35)?;
        let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [0.0, 20.0, 10.0, 30.0]])?;
        // the object equals anchor 0, landmarks sit at the anchor center
        let truth = truth(&[[0.0, 0.0, 10.0, 10.0]], &[5.0; 10], &[1])?;

        let targets = matcher.match_image(&truth, &anchors)?;
        let expect = Tensor::of_slice(&[1i64, 0]);
        ensure!(
            bool::from(targets.conf.eq_tensor(&expect).all()),
            "expect [label, background] confidence targets"
        );
        ensure!(
            bool::from(targets.loc.narrow(0, 0, 1).abs().le(1e-5).all()),
            "expect identity box encoding for the exact match"
        );
        ensure!(
            bool::from(targets.landm.narrow(0, 0, 1).abs().le(1e-5).all()),
            "expect identity landmark encoding for the exact match"
        );
        Ok(())
    }

    #[test]
    fn empty_image_yields_all_background() -> Result<()> {
        let matcher = matcher(0.35)?;
        let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [0.0, 10.0, 10.0, 20.0]])?;
        let truth = GroundTruth::empty(Device::Cpu);

        let targets = matcher.match_image(&truth, &anchors)?;
        ensure!(
            bool::from(targets.conf.eq(0).all()),
            "expect all background confidence targets"
        );
        ensure!(targets.loc.size2()? == (2, 4), "unexpected loc target shape");
        ensure!(
            targets.landm.size2()? == (2, 10),
            "unexpected landmark target shape"
        );
        Ok(())
    }
}
