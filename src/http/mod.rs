pub mod connection;
pub mod request;
pub mod response;

pub use connection::Connection;
pub use request::{Method, ParsingState, Request};
pub use response::Response;
