pub mod catalog;
pub mod notification_producer;
pub mod providers;
