// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod cron_handler {
    pub use crate::cron_handler::*;
}

pub mod unsubscribe_handler {
    pub use crate::unsubscribe_handler::*;
}

pub mod webhook_handler {
    pub use crate::webhook_handler::*;
}

pub mod routes {
    pub use crate::routes::*;
}
