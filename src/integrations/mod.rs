//! External service integrations.

pub mod crm_client {
    pub use crate::crm_client::*;
}

pub mod notifications {
    pub use crate::notifications::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
