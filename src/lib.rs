pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod mail;
pub mod model;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
