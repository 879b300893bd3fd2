//! HTTP surface of the access-control core: token transport, the request
//! gate, session endpoints and error mapping.

pub mod app;
pub mod context;
pub mod error;
pub mod gate;
pub mod middleware;
pub mod session;
pub mod transport;

pub use app::{AuthServices, build_app};
pub use context::CurrentPrincipal;
pub use error::AuthError;
pub use gate::{CSRF_HEADER, Gatekeeper};
pub use session::SessionService;
pub use transport::{CookiePolicy, TokenSource, TokenTransport, TransportError};
