pub use anyhow::{bail, ensure, format_err, Error, Result};
pub use getset::Getters;
pub use itertools::{izip, Itertools as _};
pub use log::warn;
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    convert::{TryFrom, TryInto},
};
pub use tch::{Device, Kind, Reduction, Tensor};
pub use tch_boxes::{
    CyCxHWTensor, CyCxHWTensorUnchecked, TensorExt as _, TlbrTensor, TlbrTensorUnchecked,
};
pub use tch_tensor_like::TensorLike;
