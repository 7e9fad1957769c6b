pub mod address;
pub mod content;
pub mod error;
pub mod value;

pub use address::*;
pub use content::*;
pub use error::*;
pub use value::*;
