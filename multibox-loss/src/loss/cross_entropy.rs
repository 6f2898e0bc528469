use crate::common::*;

/// Sparse target cross entropy on raw logits.
#[derive(Debug)]
pub struct CrossEntropyLoss {
    reduction: Reduction,
}

impl CrossEntropyLoss {
    pub fn new(reduction: Reduction) -> Self {
        Self { reduction }
    }

    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        // assume [len, num_classes] input and [len] int64 target shapes
        let (len, num_classes) = input.size2().unwrap();
        debug_assert!(
            target.kind() == Kind::Int64 && target.size1().unwrap() == len,
            "expect target a [{}] int64 tensor",
            len
        );
        debug_assert!(
            bool::from(target.ge(0).all()) && bool::from(target.lt(num_classes).all()),
            "target values must be in range of [0, {})",
            num_classes
        );

        // return zero tensor if (1) input is empty and (2) using mean reduction
        if input.is_empty() && self.reduction == Reduction::Mean {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        // log-sum-exp over the logits minus the target logit stays stable
        // for large magnitudes
        let picked = input.gather(1, &target.view([-1, 1]), false);
        let loss = (input.logsumexp(&[1], true) - picked).view([-1]);

        match self.reduction {
            Reduction::None => loss,
            Reduction::Sum => loss.sum(Kind::Float),
            Reduction::Mean => loss.mean(Kind::Float),
            Reduction::Other(_) => unimplemented!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::abs_diff_eq;

    #[test]
    fn matches_the_analytic_value() -> Result<()> {
        let loss_fn = CrossEntropyLoss::new(Reduction::Sum);
        let input = Tensor::of_slice(&[2.0f32, 1.0, 0.5, 0.25]).view([2, 2]);
        let target = Tensor::of_slice(&[1i64, 0]);

        let loss = f64::from(&loss_fn.forward(&input, &target));
        let expect = ((2.0f64.exp() + 1.0f64.exp()).ln() - 1.0)
            + ((0.5f64.exp() + 0.25f64.exp()).ln() - 0.5);
        ensure!(
            abs_diff_eq!(loss, expect, epsilon = 1e-5),
            "unexpected loss value {} vs {}",
            loss,
            expect
        );
        Ok(())
    }

    #[test]
    fn no_reduction_keeps_per_sample_losses() -> Result<()> {
        let loss_fn = CrossEntropyLoss::new(Reduction::None);
        let input = Tensor::of_slice(&[0.0f32, 0.0, 3.0, -1.0]).view([2, 2]);
        let target = Tensor::of_slice(&[0i64, 1]);

        let loss = loss_fn.forward(&input, &target);
        ensure!(loss.size1()? == 2, "expect one loss per sample");

        let first = f64::from(&loss.narrow(0, 0, 1));
        ensure!(
            abs_diff_eq!(first, 2.0f64.ln(), epsilon = 1e-5),
            "uniform logits must reduce to ln(num_classes)"
        );
        Ok(())
    }

    #[test]
    fn empty_input_sums_to_zero() -> Result<()> {
        let loss_fn = CrossEntropyLoss::new(Reduction::Sum);
        let input = Tensor::zeros(&[0, 2], (Kind::Float, Device::Cpu));
        let target = Tensor::zeros(&[0], (Kind::Int64, Device::Cpu));

        let loss = f64::from(&loss_fn.forward(&input, &target));
        ensure!(loss == 0.0, "empty input must produce a zero loss");
        Ok(())
    }
}
