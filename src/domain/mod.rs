pub mod allocation;
pub mod catalog;
pub mod customer;
pub mod money;
pub mod payment;
pub mod ports;
pub mod scoring;
pub mod subscription;
pub mod toy_box;
