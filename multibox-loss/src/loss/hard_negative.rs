use crate::common::*;

#[derive(Debug, Clone)]
pub struct HardNegativeMinerInit {
    pub negpos_ratio: R64,
}

impl HardNegativeMinerInit {
    pub fn build(self) -> Result<HardNegativeMiner> {
        let Self { negpos_ratio } = self;
        let negpos_ratio = negpos_ratio.raw();

        ensure!(
            negpos_ratio > 0.0,
            "negpos_ratio must be positive, got {}",
            negpos_ratio
        );

        Ok(HardNegativeMiner { negpos_ratio })
    }
}

/// Selects the highest loss negative anchors per image, bounding the negative
/// count by a fixed ratio of the positive count.
#[derive(Debug, Clone)]
pub struct HardNegativeMiner {
    negpos_ratio: f64,
}

impl HardNegativeMiner {
    /// Select negatives from per-anchor candidate losses in shape
    /// `[batch_size, num_anchors]`, zeroed at positive anchors beforehand.
    ///
    /// Each image keeps at most
    /// `min(floor(negpos_ratio * num_positives), num_anchors - 1)` negatives,
    /// highest candidate losses first. Returns a boolean mask in the shape of
    /// the candidate losses.
    pub fn select(&self, candidate_loss: &Tensor, num_positives: &[i64]) -> Result<Tensor> {
        let (batch_size, num_anchors) = candidate_loss.size2()?;
        ensure!(
            num_positives.len() as i64 == batch_size,
            "positive counts for {} images do not agree with batch size {}",
            num_positives.len(),
            batch_size
        );
        let device = candidate_loss.device();

        // descending sort order, then each anchor's rank within that order
        let order = candidate_loss.argsort(1, true);
        let rank = order.argsort(1, false);

        let quota: Vec<i64> = num_positives
            .iter()
            .map(|&count| ((self.negpos_ratio * count as f64).floor() as i64).min(num_anchors - 1))
            .collect();
        let quota = Tensor::of_slice(&quota).view([-1, 1]).to_device(device);

        Ok(rank.lt_tensor(&quota))
    }
}
