//! Nutri Assist: a chat bot that onboards users and analyzes meal photos.

pub mod catalog;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod nutrition;
pub mod registration;
pub mod server;
pub mod storage;
pub mod store;
pub mod vision;
