// Adapters layer: Gmail transport and Google OAuth token handling.

pub mod gmail;
pub mod oauth;
