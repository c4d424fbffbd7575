pub mod input;
pub mod output;
pub mod symbol;
pub mod viewer;

pub const VERSION: &str = concat!("qrgen ", env!("CARGO_PKG_VERSION"));
