pub mod backend;
pub mod config;
pub mod handle;
pub mod process;
pub mod types;

pub use backend::*;
pub use handle::*;
