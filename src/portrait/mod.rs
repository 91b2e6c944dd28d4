pub mod canvas;
pub mod painter;
pub mod palette;

pub use painter::{decode_data_url, generate_placeholder_image};
