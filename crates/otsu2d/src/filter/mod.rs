//! Neighborhood and filter primitives shared by every strategy.

pub mod morphology;
pub mod neighborhood;
pub mod preprocess;

pub use morphology::{binarize_at, morphological_postprocess, skeletonize};
pub use neighborhood::{adaptive_window_size, local_mean, IntegralImage};
pub use preprocess::{
    adaptive_contrast_enhancement, anisotropic_diffusion, gaussian_blur, homomorphic_filter,
};
