//! Spotify authentication
//!
//! PKCE authorization-code login without a client secret or backend, plus
//! the bearer token lifecycle. There is no refresh token handling: an
//! expired or rejected token sends the user back through login.

pub mod callback;
pub mod flow;
pub mod pkce;
pub mod token;

// Re-exports for convenience
pub use callback::{CallbackCancel, CallbackListener};
pub use flow::{
    clean_redirect_url, exchange_code, AuthFlow, AuthState, CallbackParams, ExchangeRequest,
    TokenGrant,
};
pub use pkce::{PkceChallenge, PkceVerifier};
pub use token::{now_ms, Token, TokenStore};
