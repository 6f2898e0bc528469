use crate::common::*;

/// Converts between absolute boxes/landmarks and anchor-relative offsets.
///
/// Box offsets are `[dy, dx, dh, dw]`: the center offset divided by the
/// anchor size and the center variance, and the log size ratio divided by
/// the size variance. Landmark points are encoded as center offsets scaled
/// by the center variance only.
#[derive(Debug, Clone, Copy)]
pub struct BoxCoder {
    center_variance: f64,
    size_variance: f64,
}

impl BoxCoder {
    pub fn new(center_variance: f64, size_variance: f64) -> Result<Self> {
        ensure!(
            center_variance > 0.0 && size_variance > 0.0,
            "variances must be positive, got ({}, {})",
            center_variance,
            size_variance
        );
        Ok(Self {
            center_variance,
            size_variance,
        })
    }

    /// Encode matched boxes as offsets relative to the anchors.
    pub fn encode(&self, matched: &TlbrTensor, anchors: &CyCxHWTensor) -> Result<Tensor> {
        ensure!(
            matched.num_samples() == anchors.num_samples(),
            "matched box count {} does not agree with anchor count {}",
            matched.num_samples(),
            anchors.num_samples()
        );
        let matched = CyCxHWTensor::from(matched);

        let dy = (matched.cy() - anchors.cy()) / (anchors.h() * self.center_variance);
        let dx = (matched.cx() - anchors.cx()) / (anchors.w() * self.center_variance);
        let dh = (matched.h() / anchors.h()).log() / self.size_variance;
        let dw = (matched.w() / anchors.w()).log() / self.size_variance;

        Ok(Tensor::cat(&[dy, dx, dh, dw], 1))
    }

    /// Decode anchor-relative offsets back to absolute boxes.
    pub fn decode(&self, offsets: &Tensor, anchors: &CyCxHWTensor) -> Result<TlbrTensor> {
        let (len, entries) = offsets.size2()?;
        ensure!(
            len == anchors.num_samples() && entries == 4,
            "expect a [{}, 4] offset tensor, got {:?}",
            anchors.num_samples(),
            offsets.size()
        );

        let dy = offsets.narrow(1, 0, 1);
        let dx = offsets.narrow(1, 1, 1);
        let dh = offsets.narrow(1, 2, 1);
        let dw = offsets.narrow(1, 3, 1);

        let cy = anchors.cy() + dy * (anchors.h() * self.center_variance);
        let cx = anchors.cx() + dx * (anchors.w() * self.center_variance);
        let h = anchors.h() * (dh * self.size_variance).exp();
        let w = anchors.w() * (dw * self.size_variance).exp();

        let center: CyCxHWTensor = CyCxHWTensorUnchecked { cy, cx, h, w }.try_into()?;
        Ok(TlbrTensor::from(&center))
    }

    /// Encode landmark points as offsets from the anchor centers.
    pub fn encode_landmarks(&self, matched: &Tensor, anchors: &CyCxHWTensor) -> Result<Tensor> {
        let (len, entries) = matched.size2()?;
        ensure!(
            len == anchors.num_samples() && entries == 10,
            "expect a [{}, 10] landmark tensor, got {:?}",
            anchors.num_samples(),
            matched.size()
        );

        let points = matched.view([-1, 5, 2]);
        let centers = Tensor::cat(&[anchors.cy(), anchors.cx()], 1).unsqueeze(1);
        let sizes = Tensor::cat(&[anchors.h(), anchors.w()], 1).unsqueeze(1);
        let offsets = (points - centers) / (sizes * self.center_variance);

        Ok(offsets.view([-1, 10]))
    }

    /// Decode anchor-relative landmark offsets back to absolute points.
    pub fn decode_landmarks(&self, offsets: &Tensor, anchors: &CyCxHWTensor) -> Result<Tensor> {
        let (len, entries) = offsets.size2()?;
        ensure!(
            len == anchors.num_samples() && entries == 10,
            "expect a [{}, 10] offset tensor, got {:?}",
            anchors.num_samples(),
            offsets.size()
        );

        let points = offsets.view([-1, 5, 2]);
        let centers = Tensor::cat(&[anchors.cy(), anchors.cx()], 1).unsqueeze(1);
        let sizes = Tensor::cat(&[anchors.h(), anchors.w()], 1).unsqueeze(1);
        let decoded = points * (sizes * self.center_variance) + centers;

        Ok(decoded.view([-1, 10]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn box_round_trip() -> Result<()> {
        let coder = BoxCoder::new(0.1, 0.2)?;
        let anchors = CyCxHWTensor::from(&tlbr(&[[0.0, 0.0, 4.0, 4.0], [2.0, 2.0, 6.0, 8.0]])?);
        let truth = tlbr(&[[0.5, 1.0, 3.5, 3.0], [1.0, 2.0, 5.0, 7.0]])?;

        let offsets = coder.encode(&truth, &anchors)?;
        let decoded = coder.decode(&offsets, &anchors)?;

        for (lhs, rhs) in [
            (truth.t(), decoded.t()),
            (truth.l(), decoded.l()),
            (truth.b(), decoded.b()),
            (truth.r(), decoded.r()),
        ] {
            ensure!(
                bool::from((lhs - rhs).abs().le(1e-4).all()),
                "round trip mismatch"
            );
        }
        Ok(())
    }

    #[test]
    fn identity_encoding_is_zero() -> Result<()> {
        let coder = BoxCoder::new(0.1, 0.2)?;
        let boxes = tlbr(&[[0.0, 0.0, 4.0, 4.0], [2.0, 2.0, 6.0, 8.0]])?;
        let anchors = CyCxHWTensor::from(&boxes);

        let offsets = coder.encode(&boxes, &anchors)?;
        ensure!(
            bool::from(offsets.abs().le(1e-6).all()),
            "identity encoding should be zero"
        );
        Ok(())
    }

    #[test]
    fn landmark_round_trip() -> Result<()> {
        let coder = BoxCoder::new(0.1, 0.2)?;
        let anchors = CyCxHWTensor::from(&tlbr(&[[0.0, 0.0, 4.0, 4.0], [2.0, 2.0, 6.0, 8.0]])?);
        let landmarks = Tensor::of_slice(&[
            1.0f32, 1.5, 2.0, 2.5, 3.0, 3.5, 0.5, 0.25, 1.25, 2.75, //
            4.0, 3.0, 5.0, 6.0, 4.5, 5.5, 3.25, 4.75, 5.75, 6.25,
        ])
        .view([2, 10]);

        let offsets = coder.encode_landmarks(&landmarks, &anchors)?;
        let decoded = coder.decode_landmarks(&offsets, &anchors)?;

        ensure!(
            bool::from((decoded - landmarks).abs().le(1e-4).all()),
            "round trip mismatch"
        );
        Ok(())
    }

    #[test]
    fn non_positive_variance_is_rejected() {
        assert!(BoxCoder::new(0.0, 0.2).is_err());
        assert!(BoxCoder::new(0.1, -1.0).is_err());
    }
}
