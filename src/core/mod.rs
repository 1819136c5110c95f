// Domain-layer modules and shared errors/models
pub mod grant_scheme {
    pub use crate::grant_scheme::*;
}

pub mod catalog {
    pub use crate::catalog::*;
}

pub mod tariff {
    pub use crate::tariff::*;
}

pub mod financing {
    pub use crate::financing::*;
}

pub mod quote {
    pub use crate::quote::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod dedup {
    pub use crate::dedup::*;
}

pub mod wizard {
    pub use crate::wizard::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
