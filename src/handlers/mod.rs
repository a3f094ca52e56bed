pub mod public;
pub mod worker;
