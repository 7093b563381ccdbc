#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use surfalign_3d as geom;

#[doc(inline)]
pub use surfalign_icp as icp;
