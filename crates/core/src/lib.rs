#![forbid(unsafe_code)]

pub mod analytics;
pub mod error;
pub mod generator;
pub mod matching;
pub mod model;
pub mod scheduler;
pub mod study;
pub mod time;

pub use error::Error;
pub use time::Clock;
