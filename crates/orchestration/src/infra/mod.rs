pub mod time_checker;

pub use time_checker::*;
