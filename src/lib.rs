pub mod api;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod poller;
pub mod registry;
pub mod replies;
