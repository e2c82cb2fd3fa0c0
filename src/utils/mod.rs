pub mod table;
pub mod text;
pub mod time;

pub use table::render_table;
pub use text::{format_rate, sparkline_glyphs};
pub use time::{format_age, format_local};
