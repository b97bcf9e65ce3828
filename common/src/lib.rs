//! Definitions shared between the dispatcher and the script-call layer that drives it

pub mod error;
pub mod requests;
pub mod responses;
pub mod types;
pub mod validate;
pub mod value;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::requests::*;
    pub use crate::responses::*;
    pub use crate::types::*;
    pub use crate::validate::*;
    pub use crate::value::*;
}
