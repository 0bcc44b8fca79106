// Pipeline modules organized by functionality
pub mod sentiment;
pub mod utils;
