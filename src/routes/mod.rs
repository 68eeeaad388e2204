pub(crate) mod health_check;
mod root;
mod videos;

pub use health_check::*;
pub use root::*;
pub use videos::*;
