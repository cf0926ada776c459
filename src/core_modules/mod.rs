pub mod brightness;
pub mod bucket_index;
pub mod correspondence;
pub mod lab;
pub mod pixel;
pub mod utils;
