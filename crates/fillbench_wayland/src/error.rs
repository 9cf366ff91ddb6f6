use thiserror::Error;
use wayland_client::globals::{BindError, GlobalError};
use wayland_client::{ConnectError, DispatchError};

#[derive(Debug, Error)]
pub enum WaylandError {
    #[error("failed to connect to the Wayland display")]
    Connect(#[from] ConnectError),

    #[error("failed to read the global registry")]
    Registry(#[from] GlobalError),

    #[error("compositor does not offer {interface}")]
    MissingGlobal {
        interface: &'static str,
        #[source]
        source: BindError,
    },

    #[error("protocol dispatch failed")]
    Dispatch(#[from] DispatchError),

    #[error("surface closed before its first configure")]
    ClosedBeforeConfigure,
}
