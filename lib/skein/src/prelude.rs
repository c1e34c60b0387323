//! Prelude module for convenient imports.
//!
//! ```ignore
//! use skein::prelude::*;
//! ```

pub use crate::middleware::{
    AuthStrategy, Backoff, LogLevel, RateLimitPolicy, RetryCondition, RetryPolicy,
    StatusValidator, ThrottlePolicy, TokenRefresher, Tokens,
};
pub use crate::{
    Body, Client, ConfigKey, Configs, Error, Http, HttpResponse, InMemorySecureCache, Method,
    MockPolicy, Request, Response, Result, SecureCacheKey, StatusCode,
};
pub use serde::{Deserialize, Serialize};
