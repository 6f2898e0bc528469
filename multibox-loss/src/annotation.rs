use crate::common::*;

/// Ground truth annotations for one image.
///
/// Landmarks are five (y, x) points flattened to 10 values per object, in
/// the same y-first axis order as the box tensors. Label 0 is reserved for
/// background, so checked construction rejects labels below 1; the upper
/// bound is checked against `num_classes` when the loss consumes the
/// annotations.
#[derive(Debug, TensorLike, Getters)]
pub struct GroundTruth {
    /// Object boxes in TLBR format.
    #[get = "pub"]
    boxes: TlbrTensor,
    /// Landmark points in shape `[num_objects, 10]`.
    #[get = "pub"]
    landmarks: Tensor,
    /// Class labels in shape `[num_objects]` of int64.
    #[get = "pub"]
    labels: Tensor,
}

/// Unchecked ground truth annotations for one image.
#[derive(Debug, TensorLike)]
pub struct GroundTruthUnchecked {
    pub boxes: TlbrTensorUnchecked,
    pub landmarks: Tensor,
    pub labels: Tensor,
}

impl GroundTruth {
    pub fn num_objects(&self) -> i64 {
        self.boxes.num_samples()
    }

    pub fn device(&self) -> Device {
        self.boxes.device()
    }

    /// An annotation set with no objects.
    pub fn empty(device: Device) -> Self {
        let column = || Tensor::zeros(&[0, 1], (Kind::Float, device));
        let boxes = TlbrTensorUnchecked {
            t: column(),
            l: column(),
            b: column(),
            r: column(),
        }
        .try_into()
        .unwrap();

        Self {
            boxes,
            landmarks: Tensor::zeros(&[0, 10], (Kind::Float, device)),
            labels: Tensor::zeros(&[0], (Kind::Int64, device)),
        }
    }
}

impl TryFrom<GroundTruthUnchecked> for GroundTruth {
    type Error = Error;

    fn try_from(from: GroundTruthUnchecked) -> Result<Self, Self::Error> {
        let GroundTruthUnchecked {
            boxes,
            landmarks,
            labels,
        } = from;

        let boxes: TlbrTensor = boxes.try_into()?;
        let num_objects = boxes.num_samples();

        let (landm_len, landm_entries) = landmarks.size2()?;
        ensure!(
            landm_len == num_objects && landm_entries == 10,
            "expect a [{}, 10] landmark tensor, got {:?}",
            num_objects,
            landmarks.size()
        );

        let label_len = labels.size1()?;
        ensure!(
            label_len == num_objects && labels.kind() == Kind::Int64,
            "expect a [{}] int64 label tensor",
            num_objects
        );
        ensure!(
            bool::from(labels.ge(1).all()),
            "labels must be at least 1, label 0 is reserved for background"
        );

        ensure!(
            boxes.device() == landmarks.device() && boxes.device() == labels.device(),
            "device mismatch"
        );

        Ok(Self {
            boxes,
            landmarks,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(
        boxes: &[[f32; 4]],
        landmarks_len: i64,
        labels: &[i64],
    ) -> Result<GroundTruth> {
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
            landmarks: Tensor::zeros(&[landmarks_len, 10], (Kind::Float, Device::Cpu)),
            labels: Tensor::of_slice(labels),
        }
        .try_into()
    }

    #[test]
    fn checked_construction() -> Result<()> {
        let truth = annotation(&[[0.0, 0.0, 2.0, 2.0]], 1, &[1])?;
        ensure!(truth.num_objects() == 1, "unexpected object count");
        Ok(())
    }

    #[test]
    fn background_label_is_rejected() {
        assert!(annotation(&[[0.0, 0.0, 2.0, 2.0]], 1, &[0]).is_err());
        assert!(annotation(&[[0.0, 0.0, 2.0, 2.0]], 1, &[-1]).is_err());
    }

    #[test]
    fn degenerate_box_is_rejected() {
        assert!(annotation(&[[0.0, 0.0, 0.0, 2.0]], 1, &[1]).is_err());
    }

    #[test]
    fn landmark_shape_is_enforced() {
        assert!(annotation(&[[0.0, 0.0, 2.0, 2.0]], 2, &[1]).is_err());
    }

    #[test]
    fn empty_annotation() {
        let truth = GroundTruth::empty(Device::Cpu);
        assert_eq!(truth.num_objects(), 0);
    }
}
