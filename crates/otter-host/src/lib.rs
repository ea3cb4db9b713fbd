//! otter-host - the host side of Otter's native binding boundary.
//!
//! Script code never touches native objects directly. It calls named ops
//! with [`HostValue`] arguments through a [`HostContext`]; each op runs to
//! completion on the calling thread and either returns a value or raises a
//! [`HostError`].
//!
//! # Example
//!
//! ```
//! use otter_host::{Extension, HostContext, HostValue, op_sync};
//!
//! let ctx = HostContext::builder()
//!     .extension(Extension::new("echo").with_ops(vec![op_sync("echo", |_, mut args| {
//!         Ok(args.pop().unwrap_or_default())
//!     })]))
//!     .build()
//!     .unwrap();
//!
//! let out = ctx.call("echo", vec![HostValue::from("hi")]).unwrap();
//! assert_eq!(out, HostValue::from("hi"));
//! ```

pub mod context;
pub mod error;
pub mod extension;
pub mod value;

pub use context::{HostContext, HostContextBuilder};
pub use error::{HostError, HostResult};
pub use extension::{Extension, ExtensionState, OpContext, OpDecl, OpResult, op_sync};
pub use value::HostValue;
