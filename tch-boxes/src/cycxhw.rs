use crate::{common::*, tlbr::TlbrTensor};

/// Checked tensor of batched box parameters in CyCxHW format.
#[derive(Debug, TensorLike, Getters)]
pub struct CyCxHWTensor {
    /// The center y parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) cy: Tensor,
    /// The center x parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) cx: Tensor,
    /// The height parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) h: Tensor,
    /// The width parameter in shape `[len, 1]`.
    #[get = "pub"]
    pub(crate) w: Tensor,
}

/// Unchecked tensor of batched box parameters in CyCxHW format.
#[derive(Debug, TensorLike)]
pub struct CyCxHWTensorUnchecked {
    pub cy: Tensor,
    pub cx: Tensor,
    pub h: Tensor,
    pub w: Tensor,
}

impl CyCxHWTensor {
    pub fn num_samples(&self) -> i64 {
        let (num, _) = self.cy.size2().unwrap();
        num
    }

    pub fn device(&self) -> Device {
        self.cy.device()
    }
}

impl TryFrom<CyCxHWTensorUnchecked> for CyCxHWTensor {
    type Error = Error;

    fn try_from(from: CyCxHWTensorUnchecked) -> Result<Self, Self::Error> {
        let CyCxHWTensorUnchecked { cy, cx, h, w } = from;
        match (cy.size2()?, cx.size2()?, h.size2()?, w.size2()?) {
            ((cy_len, 1), (cx_len, 1), (h_len, 1), (w_len, 1)) => ensure!(
                cy_len == cx_len && cy_len == h_len && cy_len == w_len,
                "size mismatch"
            ),
            _ => bail!("size mismatch"),
        };
        ensure!(
            cy.device() == cx.device() && cy.device() == h.device() && cy.device() == w.device(),
            "device mismatch"
        );
        Ok(Self { cy, cx, h, w })
    }
}

impl From<CyCxHWTensor> for CyCxHWTensorUnchecked {
    fn from(from: CyCxHWTensor) -> Self {
        let CyCxHWTensor { cy, cx, h, w } = from;
        Self { cy, cx, h, w }
    }
}

impl From<&TlbrTensor> for CyCxHWTensor {
    fn from(from: &TlbrTensor) -> Self {
        let h = from.b() - from.t();
        let w = from.r() - from.l();
        let cy = from.t() + &h / 2.0;
        let cx = from.l() + &w / 2.0;
        Self { cy, cx, h, w }
    }
}
