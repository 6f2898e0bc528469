use crate::common::*;

pub trait TensorExt {
    fn is_empty(&self) -> bool;
}

impl TensorExt for Tensor {
    fn is_empty(&self) -> bool {
        self.numel() == 0
    }
}
