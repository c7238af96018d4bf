pub mod attendance;
pub mod batch;
pub mod catalog;
pub mod component;
pub mod employee;
pub mod job;
pub mod money;
pub mod period;
pub mod ports;
pub mod record;
