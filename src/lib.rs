//! Single-shot IMAP4rev1 mail retrieval client with a reconciling local mirror.
//!
//! See [`config::Config`] for the input surface, [`session::Session`] for the
//! protocol driver, and [`store::LocalStore`] for the on-disk mirror.

pub mod authfile;
pub mod config;
pub mod error;
pub mod parser;
pub mod reader;
pub mod session;
pub mod store;
pub mod transport;

pub use authfile::Credentials;
pub use config::Config;
pub use error::{Error, Result};
pub use session::{RunSummary, Session};
pub use store::LocalStore;
pub use transport::Transport;
