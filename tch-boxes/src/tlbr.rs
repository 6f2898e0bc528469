use crate::{common::*, cycxhw::CyCxHWTensor};

/// Checked tensor of batched box parameters in TLBR format.
///
/// Checked construction rejects boxes with non-positive extent, which would
/// divide by zero in anchor offset encoding.
#[derive(Debug, TensorLike, Getters)]
pub struct TlbrTensor {
    /// The top parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) t: Tensor,
    /// The left parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) l: Tensor,
    /// The bottom parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) b: Tensor,
    /// The right parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) r: Tensor,
}

/// Unchecked tensor of batched box parameters in TLBR format.
#[derive(Debug, TensorLike)]
pub struct TlbrTensorUnchecked {
    pub t: Tensor,
    pub l: Tensor,
    pub b: Tensor,
    pub r: Tensor,
}

impl TlbrTensor {
    pub fn num_samples(&self) -> i64 {
        let (num, _) = self.t.size2().unwrap();
        num
    }

    pub fn device(&self) -> Device {
        self.t.device()
    }

    /// Compute box area.
    pub fn area(&self) -> Tensor {
        let Self { t, l, b, r } = self;
        (b - t) * (r - l)
    }

    /// Select boxes along the sample dimension.
    pub fn index_select(&self, indexes: &Tensor) -> Self {
        let Self { t, l, b, r } = self;
        Self {
            t: t.index_select(0, indexes),
            l: l.index_select(0, indexes),
            b: b.index_select(0, indexes),
            r: r.index_select(0, indexes),
        }
    }

    /// Compute the pairwise Jaccard overlap with the other box tensor, in
    /// shape `[self.num_samples(), other.num_samples()]`.
    pub fn pairwise_iou_with(&self, other: &Self) -> Tensor {
        let inter_t = self.t.maximum(&other.t.view([1, -1]));
        let inter_l = self.l.maximum(&other.l.view([1, -1]));
        let inter_b = self.b.minimum(&other.b.view([1, -1]));
        let inter_r = self.r.minimum(&other.r.view([1, -1]));
        let inter_area = (inter_b - inter_t).clamp_min(0.0) * (inter_r - inter_l).clamp_min(0.0);
        let union_area = self.area() + other.area().view([1, -1]) - &inter_area + EPSILON;
        inter_area / union_area
    }
}

impl TryFrom<TlbrTensorUnchecked> for TlbrTensor {
    type Error = Error;

    fn try_from(from: TlbrTensorUnchecked) -> Result<Self, Self::Error> {
        let TlbrTensorUnchecked { t, l, b, r } = from;
        match (t.size2()?, l.size2()?, b.size2()?, r.size2()?) {
            ((t_len, 1), (l_len, 1), (b_len, 1), (r_len, 1)) => ensure!(
                t_len == l_len && t_len == b_len && t_len == r_len,
                "size mismatch"
            ),
            _ => bail!("size mismatch"),
        };
        ensure!(
            t.device() == l.device() && t.device() == b.device() && t.device() == r.device(),
            "device mismatch"
        );
        ensure!(
            bool::from((&b - &t).gt(0.0).all()) && bool::from((&r - &l).gt(0.0).all()),
            "degenerate box: bottom and right must be strictly greater than top and left"
        );
        Ok(Self { t, l, b, r })
    }
}

impl From<TlbrTensor> for TlbrTensorUnchecked {
    fn from(from: TlbrTensor) -> Self {
        let TlbrTensor { t, l, b, r } = from;
        Self { t, l, b, r }
    }
}

impl From<&CyCxHWTensor> for TlbrTensor {
    fn from(from: &CyCxHWTensor) -> Self {
        let half_h = from.h() / 2.0;
        let half_w = from.w() / 2.0;
        Self {
            t: from.cy() - &half_h,
            l: from.cx() - &half_w,
            b: from.cy() + &half_h,
            r: from.cx() + &half_w,
        }
    }
}
