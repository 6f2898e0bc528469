//! Loss function building blocks.

mod cross_entropy;
mod hard_negative;
mod multibox;
mod smooth_l1;

pub use cross_entropy::*;
pub use hard_negative::*;
pub use multibox::*;
pub use smooth_l1::*;
