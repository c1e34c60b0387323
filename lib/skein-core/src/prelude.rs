//! Prelude module for convenient imports.
//!
//! ```ignore
//! use skein_core::prelude::*;
//! ```

pub use crate::{
    Body, ConfigKey, Configs, ContentType, Error, Method, Request, Response, Result, Serializer,
    Transport, from_json, to_form, to_json,
};
