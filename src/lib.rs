//! One-shot http 1.1 client.
//!
//! One connection, one request, one response. The exchange settles exactly
//! once, no matter whether the response ends, the connection drops or an
//! error occurs first, and the connection is closed exactly once.
//!
//! ```no_run
//! use oneshot_http::{Config, ConsoleSink, Driver, Target};
//!
//! let target: Target = "https://api.github.com/zen".parse()?;
//! let mut sink = ConsoleSink::stdout();
//!
//! Driver::new(Config::new(target)).run(&mut sink)?;
//! # Ok::<_, oneshot_http::Error>(())
//! ```

#[macro_use]
extern crate log;

// Re-export the basis for this library.
pub use http;

mod error;
pub use error::{DecodeError, Error};

mod util;

mod target;
pub use target::{Scheme, Target};

pub mod codec;

mod config;
pub use config::{Config, RequestForm};

pub mod transport;

mod guard;
pub use guard::{completion, Completion, CompletionGuard, CompletionWaiter, GuardState};

mod sink;
pub use sink::{ConsoleSink, ResponseSink};

mod driver;
pub use driver::Driver;
