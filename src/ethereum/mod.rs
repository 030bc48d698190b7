pub mod abi;
pub mod cache;
pub mod model;
pub mod parser;
pub mod utils;
