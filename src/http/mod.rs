//! HTTP transport adaptation.
//!
//! # Data Flow
//! ```text
//! hyper request (decoded event)
//!     → server.rs (event handler, fault policy)
//!     → request.rs (translate into NormalizedRequest)
//!     → [pipeline services the request]
//!     → writer.rs (frames queued by the pipeline, streamed to the client)
//! ```

pub mod request;
pub mod server;
pub mod writer;

pub use request::{translate, NormalizedRequest, RequestBody, TranslateError, TranslatorOptions};
pub use server::{CometServer, ServerError};
pub use writer::{Frame, FrameStream, ResponseWriter, WriterError};
