use super::{
    cross_entropy::CrossEntropyLoss,
    hard_negative::{HardNegativeMiner, HardNegativeMinerInit},
    smooth_l1::SmoothL1Loss,
};
use crate::{
    annotation::GroundTruth,
    coder::BoxCoder,
    common::*,
    matcher::{MatchedTargets, TargetMatcher, TargetMatcherInit},
};

#[derive(Debug)]
pub struct MultiBoxLossInit {
    pub num_classes: i64,
    pub overlap_threshold: R64,
    pub negpos_ratio: R64,
    pub variances: [R64; 2],
    pub hard_negative_mining: bool,
}

impl Default for MultiBoxLossInit {
    fn default() -> Self {
        Self {
            num_classes: 2,
            overlap_threshold: r64(0.35),
            negpos_ratio: r64(7.0),
            variances: [r64(0.1), r64(0.2)],
            hard_negative_mining: true,
        }
    }
}

impl MultiBoxLossInit {
    pub fn build(self) -> Result<MultiBoxLoss> {
        let Self {
            num_classes,
            overlap_threshold,
            negpos_ratio,
            variances,
            hard_negative_mining,
        } = self;
        let [center_variance, size_variance] = variances;

        ensure!(
            num_classes >= 2,
            "num_classes must cover background and at least one foreground class, got {}",
            num_classes
        );

        let coder = BoxCoder::new(center_variance.raw(), size_variance.raw())?;
        let matcher = TargetMatcherInit {
            overlap_threshold,
            coder,
        }
        .build()?;
        let miner = if hard_negative_mining {
            Some(HardNegativeMinerInit { negpos_ratio }.build()?)
        } else {
            None
        };

        Ok(MultiBoxLoss {
            num_classes,
            matcher,
            miner,
            candidate_loss: CrossEntropyLoss::new(Reduction::None),
            classification_loss: CrossEntropyLoss::new(Reduction::Sum),
            location_loss: SmoothL1Loss::new(Reduction::Sum),
            landmark_loss: SmoothL1Loss::new(Reduction::Sum),
        })
    }
}

/// Raw detection head outputs for a batch.
#[derive(Debug, TensorLike)]
pub struct Predictions {
    /// Box offset predictions in shape `[batch_size, num_anchors, 4]`.
    pub loc: Tensor,
    /// Class logits in shape `[batch_size, num_anchors, num_classes]`.
    pub conf: Tensor,
    /// Landmark offset predictions in shape `[batch_size, num_anchors, 10]`.
    pub landm: Tensor,
}

/// The three loss terms, already normalized. The caller weights and combines
/// them.
#[derive(Debug, TensorLike)]
pub struct MultiBoxLossOutput {
    pub loc_loss: Tensor,
    pub conf_loss: Tensor,
    pub landm_loss: Tensor,
}

/// Multi-task detection loss over dense anchors: Smooth L1 box and landmark
/// regression over positive anchors and hard negative mined cross entropy
/// classification.
#[derive(Debug)]
pub struct MultiBoxLoss {
    num_classes: i64,
    matcher: TargetMatcher,
    miner: Option<HardNegativeMiner>,
    candidate_loss: CrossEntropyLoss,
    classification_loss: CrossEntropyLoss,
    location_loss: SmoothL1Loss,
    landmark_loss: SmoothL1Loss,
}

impl MultiBoxLoss {
    pub fn forward(
        &self,
        predictions: &Predictions,
        anchors: &CyCxHWTensor,
        targets: &[GroundTruth],
    ) -> Result<MultiBoxLossOutput> {
        let Predictions {
            loc: loc_data,
            conf: conf_data,
            landm: landm_data,
        } = predictions;
        let num_anchors = anchors.num_samples();

        let (batch_size, loc_anchors, loc_entries) = loc_data.size3()?;
        let (conf_batch, conf_anchors, num_classes) = conf_data.size3()?;
        let (landm_batch, landm_anchors, landm_entries) = landm_data.size3()?;

        ensure!(
            conf_batch == batch_size && landm_batch == batch_size,
            "prediction batch sizes do not agree: loc {}, conf {}, landm {}",
            batch_size,
            conf_batch,
            landm_batch
        );
        ensure!(
            loc_anchors == num_anchors
                && conf_anchors == num_anchors
                && landm_anchors == num_anchors,
            "prediction anchor counts do not agree with the {} anchors",
            num_anchors
        );
        ensure!(
            loc_entries == 4 && landm_entries == 10,
            "expect 4 box and 10 landmark entries per anchor, got {} and {}",
            loc_entries,
            landm_entries
        );
        ensure!(
            num_classes == self.num_classes,
            "expect {} classes, got {}",
            self.num_classes,
            num_classes
        );
        ensure!(
            targets.len() as i64 == batch_size,
            "expect ground truth for {} images, got {}",
            batch_size,
            targets.len()
        );
        ensure!(
            bool::from(anchors.h().gt(0.0).all()) && bool::from(anchors.w().gt(0.0).all()),
            "anchors must have strictly positive extent"
        );
        for truth in targets {
            ensure!(
                bool::from(truth.labels().lt(self.num_classes).all()),
                "ground truth labels must be below num_classes {}",
                self.num_classes
            );
        }

        // match each image independently, then assemble the batch targets
        let (matched, num_positives) =
            tch::no_grad(|| -> Result<(Vec<MatchedTargets>, Vec<i64>)> {
                let matched: Vec<_> = targets
                    .iter()
                    .map(|truth| self.matcher.match_image(truth, anchors))
                    .try_collect()?;
                let num_positives = matched
                    .iter()
                    .map(|image| {
                        i64::from(image.conf.ne(0).to_kind(Kind::Int64).sum(Kind::Int64))
                    })
                    .collect();
                Ok((matched, num_positives))
            })?;

        let loc_t = Tensor::stack(&matched.iter().map(|m| &m.loc).collect::<Vec<_>>(), 0);
        let conf_t = Tensor::stack(&matched.iter().map(|m| &m.conf).collect::<Vec<_>>(), 0);
        let landm_t = Tensor::stack(&matched.iter().map(|m| &m.landm).collect::<Vec<_>>(), 0);

        let positive = conf_t.ne(0);
        let num_positive_total: i64 = num_positives.iter().sum();
        // the floor keeps all-background batches finite
        let normalizer = num_positive_total.max(1) as f64;
        let landmark_normalizer = num_positive_total.max(1) as f64;

        let landm_loss = {
            let mask = positive.unsqueeze(2).expand_as(landm_data);
            let landm_p = landm_data.masked_select(&mask).view([-1, 10]);
            let landm_g = landm_t.masked_select(&mask).view([-1, 10]);
            self.landmark_loss.forward(&landm_p, &landm_g) / landmark_normalizer
        };

        let loc_loss = {
            let mask = positive.unsqueeze(2).expand_as(loc_data);
            let loc_p = loc_data.masked_select(&mask).view([-1, 4]);
            let loc_g = loc_t.masked_select(&mask).view([-1, 4]);
            self.location_loss.forward(&loc_p, &loc_g) / normalizer
        };

        let conf_loss = {
            let batch_conf = conf_data.view([-1, self.num_classes]);
            let selected = match &self.miner {
                Some(miner) => {
                    let candidate = tch::no_grad(|| {
                        let per_anchor =
                            self.candidate_loss.forward(&batch_conf, &conf_t.view([-1]));
                        per_anchor
                            .view([batch_size, num_anchors])
                            .masked_fill(&positive, 0.0)
                    });
                    let negative = miner.select(&candidate, &num_positives)?;
                    positive.logical_or(&negative)
                }
                None => positive.ones_like(),
            };

            let mask = selected.unsqueeze(2).expand_as(conf_data);
            let conf_p = conf_data.masked_select(&mask).view([-1, self.num_classes]);
            let conf_g = conf_t.masked_select(&selected);
            self.classification_loss.forward(&conf_p, &conf_g) / normalizer
        };

        debug_assert!(!bool::from(loc_loss.isnan().any()), "NaN detected");
        debug_assert!(!bool::from(conf_loss.isnan().any()), "NaN detected");
        debug_assert!(!bool::from(landm_loss.isnan().any()), "NaN detected");

        Ok(MultiBoxLossOutput {
            loc_loss,
            conf_loss,
            landm_loss,
        })
    }
}
