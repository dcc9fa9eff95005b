pub mod footer;
pub mod header;
pub mod splash;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, HeaderUser};
pub use splash::draw_splash;
pub use utils::{score_color, stars, truncate};
