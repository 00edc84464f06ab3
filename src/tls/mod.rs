//! TLS for `wss://` connections, using rustls.
//!
//! The library never implements TLS itself: it builds rustls configurations
//! and wraps TCP streams with `tokio-rustls`. Wrapped streams are
//! [`Transport`](crate::Transport)s reporting `is_secure() == true`.

mod rustls_impl;

pub use rustls_impl::{
    client_config_with_native_roots, client_config_with_roots, load_certs, load_certs_from_file,
    load_private_key, load_private_key_from_file, server_config,
};

pub(crate) use rustls_impl::{accept, connect};
