pub mod auth;
pub mod cloud;
pub mod rest;
