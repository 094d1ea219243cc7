//! XML utilities.

mod utils;

pub use utils::{element_children, get_attribute, get_tag_name, leading_text};
