pub mod account;
pub mod attendance;
pub mod events;
pub mod meeting;
pub mod notification;
