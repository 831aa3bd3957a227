pub mod binding;
pub mod certificate;
pub mod credential;
pub mod discovery;
pub mod job;
pub mod location;
