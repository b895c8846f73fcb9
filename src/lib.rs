pub mod app;
pub mod model;
pub mod remote;
pub mod sim;
pub mod store;
pub mod util;
