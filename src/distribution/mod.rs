pub mod engine;
pub mod presets;
pub mod rng;
pub mod step;
pub mod template;
pub mod types;

pub use engine::{distribute, DistributeError};
pub use rng::{MarkRng, RngSource};
pub use step::Step;
pub use template::{Component, Template, TemplateError};
pub use types::{Allocation, ComponentId, Distribution, Mark, Mode, Sentinel};
