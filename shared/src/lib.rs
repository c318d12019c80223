pub mod colors;
pub mod feature;
pub mod geo;
pub mod isochrone;
pub mod nearby;
pub mod search;

pub use feature::*;
pub use geo::*;
pub use isochrone::*;
pub use nearby::*;
pub use search::*;
