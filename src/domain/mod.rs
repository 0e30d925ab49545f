//! Core value types shared by the selection engine, usage store and driver.

mod category;
mod selection;
mod strategy;

pub use category::Category;
pub use selection::{Pick, Selection};
pub use strategy::Strategy;
