pub mod data;

pub use data::{AttrMap, AttrValue, Fix, Position, Protocol};
