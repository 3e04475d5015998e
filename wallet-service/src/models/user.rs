use serde::{Deserialize, Serialize};

/// Account owner as seen by the wallet core.
///
/// Users are created by the identity service; this service only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
}
