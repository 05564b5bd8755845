pub mod generator;
pub mod pool;
pub mod presence;
pub mod range;
pub mod sweeper;
