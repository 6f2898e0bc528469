pub use anyhow::{bail, ensure, Error, Result};
pub use getset::Getters;
pub use std::{
    borrow::Borrow,
    convert::{TryFrom, TryInto},
};
pub use tch::{Device, Kind, Tensor};
pub use tch_tensor_like::TensorLike;

pub const EPSILON: f64 = 1e-16;
