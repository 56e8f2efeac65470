pub mod account;
pub mod common;
pub mod experiment;
pub mod recording;
pub mod study;

pub use account::*;
pub use common::*;
pub use experiment::*;
pub use recording::*;
pub use study::*;
