//! One WebSocket connection to the server under test.
//!
//! A [`Session`] exists only after a successful opening handshake. It owns the
//! stream exclusively; scenario runners and listeners borrow it mutably for
//! their duration.
//!
//! ## Lifecycle
//!
//! 1. **Open** - handshake complete
//! 2. **Closing** - our close frame is out, waiting for the peer's
//! 3. **Closed** - closed by either side, or the transport failed
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsprobe::{Config, Envelope, Session};
//!
//! # async fn demo() -> wsprobe::Result<()> {
//! let config = Config::from_env();
//! let mut session = Session::open(&config.endpoint, &config).await?;
//! session.send(&Envelope::get_snapshot()).await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod state;

#[allow(clippy::module_inception)]
mod session;

pub use session::Session;
pub use state::SessionState;
