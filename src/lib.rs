pub mod adapter;
pub(crate) mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod state;
pub mod stream;
pub mod transport;

mod util;
