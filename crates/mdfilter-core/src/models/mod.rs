pub mod card;
pub mod selection;

pub use card::{parse_title_id, CardKey, CardLink};
pub use selection::{StatusSelection, UnknownSelection};
