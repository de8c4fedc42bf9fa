pub mod admin_handlers;
pub mod family_handlers;
pub mod join_request_handlers;
pub mod user_handlers;
