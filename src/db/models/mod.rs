mod assistance;
mod audit;
mod backup;
mod beneficiary;
mod category;
mod resident;
mod user;

pub use assistance::*;
pub use audit::*;
pub use backup::*;
pub use beneficiary::*;
pub use category::*;
pub use resident::*;
pub use user::*;
