pub mod auth;
pub mod health;
pub mod history;
pub mod pages;
pub mod permissions;
pub mod roles;
pub mod users;
