pub mod identifiers;
pub mod mention;
pub mod outcome;
pub mod record;

pub use identifiers::*;
pub use mention::*;
pub use outcome::*;
pub use record::*;
