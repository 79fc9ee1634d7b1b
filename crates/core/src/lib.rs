pub mod cell;
pub mod clock;
pub mod error;
pub mod schema;
pub mod table;

pub use cell::Cell;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use schema::{DocumentKind, Role};
pub use table::{Dataset, Row, TableChange, TableStore};
