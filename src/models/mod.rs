// Data models shared by the services and handlers

pub mod error_page;
pub mod errors;
pub mod shared_page;
