pub mod account;
pub mod attendance;
pub mod meeting;
pub mod notification;
pub mod role;
