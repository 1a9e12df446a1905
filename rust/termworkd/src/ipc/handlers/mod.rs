pub mod assessment;
pub mod core;
pub mod marks;
pub mod session;
