use crate::{common::*, loss::MultiBoxLossInit};

/// The loss function configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The number of classes including background.
    pub num_classes: i64,
    /// The minimum anchor overlap for a positive match.
    pub overlap_thresh: R64,
    /// The maximum ratio of mined negatives to positives.
    pub neg_pos_ratio: R64,
    /// The variance pair used for offset encoding.
    #[serde(default = "default_variances")]
    pub variances: [R64; 2],
    /// Whether to mine hard negatives for the classification loss.
    #[serde(default = "default_hard_negative_mining")]
    pub hard_negative_mining: bool,
}

impl Config {
    pub fn multibox_loss_init(&self) -> MultiBoxLossInit {
        let Self {
            num_classes,
            overlap_thresh,
            neg_pos_ratio,
            variances,
            hard_negative_mining,
        } = *self;

        MultiBoxLossInit {
            num_classes,
            overlap_threshold: overlap_thresh,
            negpos_ratio: neg_pos_ratio,
            variances,
            hard_negative_mining,
        }
    }
}

fn default_variances() -> [R64; 2] {
    [r64(0.1), r64(0.2)]
}

fn default_hard_negative_mining() -> bool {
    true
}
