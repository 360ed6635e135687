pub mod announce;
pub mod flush;
