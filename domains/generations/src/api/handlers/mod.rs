pub mod admission;
pub mod generations;
pub mod worker;
