pub mod catalog;
pub mod ids;
pub mod model;
pub mod normalize;
pub mod progress;
pub mod text;
pub mod trace;
pub mod types;

pub use catalog::*;
pub use ids::*;
pub use model::*;
pub use normalize::*;
pub use progress::*;
pub use text::*;
pub use trace::*;
pub use types::*;
