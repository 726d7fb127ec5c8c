pub mod bus;
pub mod visuals;
