pub mod horse;
pub mod location;
pub mod presence;
