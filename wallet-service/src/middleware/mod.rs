pub mod auth;

pub use auth::{Authenticator, MaybePrincipal, API_KEY_HEADER};
