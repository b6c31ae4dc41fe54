use std::{net, time};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub db: Db,
    pub http: Http,
    pub jwt: Jwt,
    #[serde(default)]
    pub password: Password,
    #[serde(default)]
    pub tickets: Tickets,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase", tag = "backend")]
pub enum Db {
    Postgres { url: String },
    Memory,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct Jwt {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub expiration_time: time::Duration,
}

#[derive(Clone, Copy, Deserialize)]
pub struct Password {
    /// bcrypt cost factor.
    pub hash_cost: u32,
}

impl Default for Password {
    fn default() -> Self {
        Self {
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Clone, Copy, Deserialize)]
pub struct Tickets {
    /// How long after creation a new ticket falls due.
    #[serde(with = "humantime_serde")]
    pub due_in: time::Duration,
}

impl Default for Tickets {
    fn default() -> Self {
        Self {
            due_in: time::Duration::from_secs(10 * 24 * 60 * 60),
        }
    }
}
