pub mod analysis;
pub mod finding;
pub mod work_item;
