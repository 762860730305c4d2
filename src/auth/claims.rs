use serde::{Deserialize, Serialize};

/// Which collaborator is calling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    /// The chat front-end relaying user messages.
    Frontend,
    /// The payment service reporting completed purchases.
    Payments,
}

/// JWT payload of a service token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // service name
    pub iat: usize,       // issued at (unix timestamp)
    pub exp: usize,       // expires at (unix timestamp)
    pub iss: String,      // issuer
    pub aud: String,      // audience
    pub role: CallerRole,
}
