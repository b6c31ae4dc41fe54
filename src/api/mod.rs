pub mod ticket;
pub mod user;

use serde::{Deserialize, Serialize};

pub use self::{ticket::Ticket, user::User};

/// Body of every failed request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Error {
    pub error: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Message {
    pub message: String,
}
