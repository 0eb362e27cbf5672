pub mod routes;
pub mod scratch;
pub mod spec;

pub use routes::*;
pub use scratch::*;
pub use spec::*;
