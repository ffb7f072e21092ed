pub mod blender;
pub mod generator;
pub mod views;

pub use blender::{BlackLittermanBlender, BlackLittermanConfig, BlackLittermanOutput};
pub use generator::{MomentumViews, NoViews, StaticViews, ViewGenerator, ViewGeneratorConfig};
pub use views::{View, ViewSet, ViewUncertainty};
